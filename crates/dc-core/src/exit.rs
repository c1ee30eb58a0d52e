//! Explicit process-exit callbacks.
//!
//! Rust has no interpreter-style `atexit`, so the host owns the shutdown
//! point: it either calls [`ShutdownHooks::run`] itself or holds a guard that
//! does so on drop.

use std::fmt;
use std::sync::Mutex;

use crate::fail_safe::panic_message;

pub type ExitCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// Exit callbacks already ran; late registrations would never fire.
    ShutdownStarted,
    Injection(String),
    Other(String),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::ShutdownStarted => write!(f, "shutdown already started"),
            SetupError::Injection(msg) => write!(f, "injection failed: {msg}"),
            SetupError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for SetupError {}

/// Somewhere to register work that must happen at normal process exit.
pub trait ExitRegistry: Send + Sync {
    fn register(&self, callback: ExitCallback) -> Result<(), SetupError>;
}

#[derive(Default)]
struct HooksState {
    callbacks: Vec<ExitCallback>,
    ran: bool,
}

/// Ordered exit callbacks that run at most once.
#[derive(Default)]
pub struct ShutdownHooks {
    state: Mutex<HooksState>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.callbacks.len())
            .unwrap_or_default()
    }

    pub fn has_run(&self) -> bool {
        self.state.lock().map(|s| s.ran).unwrap_or(true)
    }

    /// Run every registered callback in registration order. Later calls are
    /// no-ops. A panicking callback is logged and does not stop the rest.
    pub fn run(&self) {
        let callbacks = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.ran {
                return;
            }
            state.ran = true;
            std::mem::take(&mut state.callbacks)
        };

        tracing::debug!(count = callbacks.len(), "running exit callbacks");
        for callback in callbacks {
            if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "exit callback panicked"
                );
            }
        }
    }
}

impl ExitRegistry for ShutdownHooks {
    fn register(&self, callback: ExitCallback) -> Result<(), SetupError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.ran {
            return Err(SetupError::ShutdownStarted);
        }
        state.callbacks.push(callback);
        Ok(())
    }
}

impl fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHooks")
            .field("pending", &self.pending())
            .field("ran", &self.has_run())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callbacks_run_once_in_order() {
        let hooks = ShutdownHooks::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            hooks
                .register(Box::new(move || log.lock().unwrap().push(i)))
                .unwrap();
        }
        assert_eq!(hooks.pending(), 3);

        hooks.run();
        hooks.run();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(hooks.has_run());
        assert_eq!(hooks.pending(), 0);
    }

    #[test]
    fn test_register_after_run_is_rejected() {
        let hooks = ShutdownHooks::new();
        hooks.run();
        let err = hooks.register(Box::new(|| {})).unwrap_err();
        assert_eq!(err, SetupError::ShutdownStarted);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let hooks = ShutdownHooks::new();
        let count = Arc::new(AtomicUsize::new(0));
        hooks.register(Box::new(|| panic!("torn down"))).unwrap();
        let c = Arc::clone(&count);
        hooks
            .register(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        hooks.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
