//! Citation collection with a runtime on/off switch.
//!
//! Host code records which components and papers it used through a single
//! [`DueSwitch`]. When instrumentation is off every call is a silent no-op;
//! when it is on, calls land in an [`ActiveCollector`]. Failures inside the
//! instrumentation are logged and swallowed, never surfaced to the host.
//!
//! Zero file I/O: persistence and rendering live behind the
//! [`SummaryBuilder`] and [`ExitRegistry`] seams.

pub mod collector;
pub mod config;
pub mod constants;
pub mod entry;
pub mod exit;
pub mod fail_safe;
pub mod injection;
pub mod summary;
pub mod switch;
pub mod versions;

#[cfg(test)]
mod test_support;

pub use collector::{
    ActiveCollector, COLLECTOR_OPERATIONS, Collector, CollectorError, CollectorState,
    InactiveCollector,
};
pub use config::{Config, parse_bool, parse_enable};
pub use constants::{
    DEFAULT_OUTPUTS, DEFAULT_STATE_FILE, ENV_ENABLE, ENV_FILE, ENV_OUTPUTS, RESERVED_NAMES,
};
pub use entry::{Citation, Entry, EntryBody};
pub use exit::{ExitCallback, ExitRegistry, SetupError, ShutdownHooks};
pub use fail_safe::{never_fail, never_fail_default, never_fail_with};
pub use injection::{CitationInjector, Injection, Injector, NoopInjector};
pub use summary::{DumpOptions, NullSummaryBuilder, Summary, SummaryBuilder, SummaryError};
pub use switch::{DueSwitch, SwitchError, SwitchHooks, bound_surface};
pub use versions::{
    ComponentInfo, ComponentQuery, ComponentResolver, ExternalVersions, StaticRegistry, Version,
    VersionError, VersionValue,
};
