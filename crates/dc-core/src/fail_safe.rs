//! Call-and-absorb helpers used at every boundary the host can reach.
//!
//! Errors are logged as warnings, panics as errors; either way the caller gets
//! the neutral value it supplied.

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

/// Run `f`, returning its value or `default` if it errs or panics.
pub fn never_fail<T, E, F>(component: &str, default: T, f: F) -> T
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            tracing::warn!(component, error = %e, "duecredit operation failed");
            default
        }
        Err(payload) => {
            tracing::error!(
                component,
                panic = %panic_message(payload.as_ref()),
                "duecredit operation panicked"
            );
            default
        }
    }
}

/// [`never_fail`] with `T::default()` as the neutral value.
pub fn never_fail_default<T, E, F>(component: &str, f: F) -> T
where
    T: Default,
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    never_fail(component, T::default(), f)
}

/// Like [`never_fail`], but the neutral value is only built on failure.
pub fn never_fail_with<T, E, F, D>(component: &str, default: D, f: F) -> T
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
    D: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            tracing::warn!(component, error = %e, "duecredit operation failed");
            default()
        }
        Err(payload) => {
            tracing::error!(
                component,
                panic = %panic_message(payload.as_ref()),
                "duecredit operation panicked"
            );
            default()
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
