//! Quiescence timers
//!
//! Each event pushes the deadline out by the full delay. The owner sleeps until
//! [`Debouncer::deadline`] and then calls [`Debouncer::take_due`].

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    /// Reset the deadline to `now + delay`
    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    /// Drop a scheduled deadline without firing
    ///
    /// Used when the work is performed directly (explicit flush, shutdown).
    pub fn clear(&mut self) {
        self.deadline = None;
    }

    /// If the deadline has passed, clear it and return true
    pub fn take_due(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Sleep until `deadline`, or forever if there is none
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_not_due_before_delay() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.schedule();
        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(!debouncer.take_due());
        assert!(debouncer.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_after_delay() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.schedule();
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(debouncer.take_due());
        assert!(!debouncer.is_scheduled());
        assert!(!debouncer.take_due());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_resets_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.schedule();
        tokio::time::advance(Duration::from_millis(80)).await;
        debouncer.schedule();
        tokio::time::advance(Duration::from_millis(80)).await;
        assert!(!debouncer.take_due());
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(debouncer.take_due());
    }

    #[test]
    fn test_unscheduled_is_never_due() {
        let mut debouncer = Debouncer::new(Duration::from_millis(0));
        assert!(!debouncer.take_due());
        assert!(debouncer.deadline().is_none());
    }
}
