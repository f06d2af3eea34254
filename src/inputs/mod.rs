pub mod debounce;
pub mod keys;

pub use debounce::{Debouncer, Throttle};
pub use keys::{intent_for_key, wheel_intent};
