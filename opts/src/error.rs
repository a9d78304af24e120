//! Store error types

use thiserror::Error;

use crate::hooks::HookId;

/// Errors surfaced by store operations
///
/// Unknown keys and writes issued before load are not errors; they are a
/// no-op and a deferral respectively.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Hook {hook} failed: {message}")]
    HookFailed { hook: HookId, message: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel error")]
    ChannelError,
}

impl StoreError {
    /// Check if this error came from a subscriber rather than the store
    pub fn is_hook_failure(&self) -> bool {
        matches!(self, StoreError::HookFailed { .. })
    }
}

/// Response from store operations
pub type StoreResponse<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hook_failure() {
        let err = StoreError::HookFailed {
            hook: 3,
            message: "boom".to_string(),
        };
        assert!(err.is_hook_failure());
        assert_eq!(err.to_string(), "Hook 3 failed: boom");
        assert!(!StoreError::ChannelError.is_hook_failure());
    }
}
