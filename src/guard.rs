//! Panic isolation for plugin-supplied code.
//!
//! Replacement closures, lifecycle hooks, event listeners and `wait_for`
//! callbacks come from plugins; a panic in one of them is turned into an
//! error for that plugin instead of unwinding through the runtime.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

pub(crate) fn catch<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}
