//! Process-wide switch with explicit start-up and shutdown.
//!
//! The host calls [`init`] once, early in `main`, and keeps the returned
//! [`ShutdownGuard`] alive until it is done. Dropping the guard runs the exit
//! callbacks, which is when collected citations get written out. Code
//! anywhere in the process reaches the switch through [`due`]; before `init`
//! (or without it) that is an inert switch whose operations do nothing.

use std::convert::Infallible;
use std::sync::{Arc, LazyLock, OnceLock};

use dc_core::{
    Collector, Config, DueSwitch, InactiveCollector, Injector, NoopInjector, ShutdownHooks,
    SwitchError, SwitchHooks, never_fail,
};

use crate::gateway::active_collector;
use crate::summary::FileSummaryBuilder;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

static INERT: LazyLock<DueSwitch> = LazyLock::new(|| {
    let stub: Arc<dyn Collector> = Arc::new(InactiveCollector::new());
    match DueSwitch::new(
        Some(Arc::clone(&stub)),
        Some(stub),
        SwitchHooks::default(),
        false,
    ) {
        Ok(switch) => switch,
        Err(e) => unreachable!("both collectors supplied: {e}"),
    }
});

/// A fully wired switch together with the exit callbacks it armed.
pub struct Runtime {
    switch: DueSwitch,
    hooks: Arc<ShutdownHooks>,
}

impl Runtime {
    pub fn new(config: &Config) -> Result<Self, SwitchError> {
        Self::with_injector(config, Arc::new(NoopInjector))
    }

    pub fn with_injector(
        config: &Config,
        injector: Arc<dyn Injector>,
    ) -> Result<Self, SwitchError> {
        let inactive = default_inactive();
        let active = inactive
            .clone()
            .map(|fallback| active_collector(&config.state_file, fallback));

        let hooks = Arc::new(ShutdownHooks::new());
        let switch = DueSwitch::new(
            inactive,
            active,
            SwitchHooks::new(
                hooks.clone(),
                injector,
                Arc::new(FileSummaryBuilder::from_config(config)),
            ),
            config.enable,
        )?;
        tracing::debug!(
            active = ?switch.active(),
            state_file = %config.state_file.display(),
            "duecredit initialized"
        );
        Ok(Self { switch, hooks })
    }

    pub fn switch(&self) -> &DueSwitch {
        &self.switch
    }

    /// Run the exit callbacks now. Later calls do nothing.
    pub fn shutdown(&self) {
        self.hooks.run();
    }
}

fn default_inactive() -> Option<Arc<dyn Collector>> {
    never_fail("inactive collector", None, || {
        let stub: Arc<dyn Collector> = Arc::new(InactiveCollector::new());
        Ok::<_, Infallible>(Some(stub))
    })
}

/// Runs the exit callbacks of the installed runtime when dropped.
///
/// Only the guard returned by the call that installed the runtime owns
/// shutdown; guards from later `init` calls are inert.
#[must_use = "dropping the guard immediately runs the exit callbacks"]
pub struct ShutdownGuard {
    hooks: Option<Arc<ShutdownHooks>>,
}

impl ShutdownGuard {
    fn owning(hooks: Arc<ShutdownHooks>) -> Self {
        Self { hooks: Some(hooks) }
    }

    fn inert() -> Self {
        Self { hooks: None }
    }

    /// Whether dropping this guard runs the exit callbacks.
    pub fn owns_shutdown(&self) -> bool {
        self.hooks.is_some()
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Some(hooks) = self.hooks.take() {
            hooks.run();
        }
    }
}

/// Install the process-wide switch from `config`.
///
/// Only the first call installs anything. Later calls log a warning and
/// return an inert guard; the first guard still decides when to shut down.
pub fn init(config: &Config) -> Result<ShutdownGuard, SwitchError> {
    init_with_injector(config, Arc::new(NoopInjector))
}

pub fn init_with_injector(
    config: &Config,
    injector: Arc<dyn Injector>,
) -> Result<ShutdownGuard, SwitchError> {
    if RUNTIME.get().is_some() {
        tracing::warn!("duecredit already initialized; ignoring new configuration");
        return Ok(ShutdownGuard::inert());
    }

    let runtime = Runtime::with_injector(config, injector)?;
    let hooks = runtime.hooks.clone();
    if RUNTIME.set(runtime).is_err() {
        tracing::warn!("duecredit initialized concurrently; keeping the first runtime");
        return Ok(ShutdownGuard::inert());
    }
    Ok(ShutdownGuard::owning(hooks))
}

/// [`init`] with configuration read from the environment.
pub fn init_from_env() -> Result<ShutdownGuard, SwitchError> {
    init(&Config::from_env())
}

/// The process-wide switch, or an inert one before [`init`].
pub fn due() -> &'static DueSwitch {
    match RUNTIME.get() {
        Some(runtime) => &runtime.switch,
        None => &INERT,
    }
}
