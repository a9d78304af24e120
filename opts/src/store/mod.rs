//! The options store
//!
//! [`OptionsStore`] is the handle callers use. It owns nothing itself: state
//! lives in a task that processes requests one at a time, so mutation is
//! serialized without locks.

mod core;
mod debounce;
mod gate;
mod manager;
mod messages;

pub use self::core::{LoadOutcome, OptionsState, SetOutcome};
pub use debounce::Debouncer;
pub use gate::InitGate;
pub use manager::{OptionsStore, Subscription};
pub use messages::{OptionsMetrics, StoreRequest};
