//! The activation switch: one stable façade over two collectors.
//!
//! [`DueSwitch`] owns an inactive and an active collector and delegates every
//! operation to whichever one is currently bound. Rebinding publishes the
//! collector and its operation surface together through an [`ArcSwap`], so a
//! concurrent reader sees either the old binding or the new one.
//!
//! The first `activate(true)` also arms exit-time dumping and hands the
//! active collector to the injector. That setup runs at most once per switch,
//! whether it succeeds or not, and deactivating never undoes it.
//!
//! Apart from the constructor, nothing here returns an error or panics into
//! the caller: failures are logged and a neutral value comes back.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::collector::{Collector, CollectorState};
use crate::constants::{INTERNAL_PREFIX, RESERVED_NAMES};
use crate::entry::{Citation, Entry};
use crate::exit::{ExitRegistry, SetupError, ShutdownHooks};
use crate::fail_safe::{never_fail_default, panic_message};
use crate::injection::{Injector, NoopInjector};
use crate::summary::{DumpOptions, NullSummaryBuilder, SummaryBuilder, SummaryError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    /// One of the two collectors was not supplied.
    Configuration { inactive: String, active: String },
    Poisoned,
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchError::Configuration { inactive, active } => write!(
                f,
                "both inactive and active collectors should be provided; \
                 got active={active}, inactive={inactive}"
            ),
            SwitchError::Poisoned => write!(f, "switch state lock poisoned"),
        }
    }
}

impl std::error::Error for SwitchError {}

/// Collaborators the switch arms on first activation.
#[derive(Clone)]
pub struct SwitchHooks {
    pub exit: Arc<dyn ExitRegistry>,
    pub injector: Arc<dyn Injector>,
    pub summary: Arc<dyn SummaryBuilder>,
}

impl SwitchHooks {
    pub fn new(
        exit: Arc<dyn ExitRegistry>,
        injector: Arc<dyn Injector>,
        summary: Arc<dyn SummaryBuilder>,
    ) -> Self {
        Self {
            exit,
            injector,
            summary,
        }
    }
}

impl Default for SwitchHooks {
    fn default() -> Self {
        Self::new(
            Arc::new(ShutdownHooks::new()),
            Arc::new(NoopInjector),
            Arc::new(NullSummaryBuilder),
        )
    }
}

/// Operation names a façade exposes for a collector offering `operations`.
pub fn bound_surface(operations: &[&'static str]) -> Vec<&'static str> {
    operations
        .iter()
        .copied()
        .filter(|op| !op.starts_with(INTERNAL_PREFIX) && !RESERVED_NAMES.contains(op))
        .collect()
}

struct Binding {
    state: Option<bool>,
    collector: Arc<dyn Collector>,
    surface: Vec<&'static str>,
}

impl Binding {
    fn new(state: Option<bool>, collector: Arc<dyn Collector>) -> Self {
        let surface = match state {
            Some(_) => bound_surface(collector.operations()),
            None => Vec::new(),
        };
        Self {
            state,
            collector,
            surface,
        }
    }
}

/// State reachable from the exit callback, which outlives any borrow of the
/// switch.
struct Shared {
    bound: ArcSwap<Binding>,
    active: Arc<dyn Collector>,
    summary: Arc<dyn SummaryBuilder>,
}

impl Shared {
    fn dump(&self, options: &DumpOptions) {
        never_fail_default("dump", || self.try_dump(options))
    }

    fn try_dump(&self, options: &DumpOptions) -> Result<(), SummaryError> {
        // A disabled run keeps a stub in the active slot; dumping it would
        // clobber whatever state is on disk.
        if self.bound.load().state != Some(true) || !self.active.is_active() {
            return Ok(());
        }
        let summary = self.summary.build(self.active.as_ref(), options)?;
        summary.dump()
    }
}

#[derive(Default)]
struct Transition {
    active: Option<bool>,
    setup_done: bool,
}

/// Façade over an inactive and an active collector.
pub struct DueSwitch {
    inactive: Arc<dyn Collector>,
    shared: Arc<Shared>,
    transition: Mutex<Transition>,
    exit: Arc<dyn ExitRegistry>,
    injector: Arc<dyn Injector>,
}

impl DueSwitch {
    /// Build the switch and apply the initial activation decision.
    ///
    /// Both collectors are required; a missing one is a wiring defect and the
    /// only error this type ever reports.
    pub fn new(
        inactive: Option<Arc<dyn Collector>>,
        active: Option<Arc<dyn Collector>>,
        hooks: SwitchHooks,
        activate: bool,
    ) -> Result<Self, SwitchError> {
        let (inactive, active) = match (inactive, active) {
            (Some(inactive), Some(active)) => (inactive, active),
            (inactive, active) => {
                return Err(SwitchError::Configuration {
                    inactive: format!("{inactive:?}"),
                    active: format!("{active:?}"),
                });
            }
        };

        let switch = Self {
            shared: Arc::new(Shared {
                bound: ArcSwap::from_pointee(Binding::new(None, Arc::clone(&inactive))),
                active,
                summary: hooks.summary,
            }),
            inactive,
            transition: Mutex::new(Transition::default()),
            exit: hooks.exit,
            injector: hooks.injector,
        };
        switch.activate(activate);
        Ok(switch)
    }

    /// `None` until the first activation decision.
    pub fn active(&self) -> Option<bool> {
        self.shared.bound.load().state
    }

    pub fn is_setup_done(&self) -> bool {
        self.transition
            .lock()
            .map(|t| t.setup_done)
            .unwrap_or(true)
    }

    /// Operation names currently delegated to the bound collector.
    pub fn surface(&self) -> Vec<&'static str> {
        self.shared.bound.load().surface.clone()
    }

    /// The collector operations are currently delegated to.
    pub fn collector(&self) -> Arc<dyn Collector> {
        Arc::clone(&self.shared.bound.load().collector)
    }

    pub fn activate(&self, target: bool) {
        never_fail_default("activate", || self.try_activate(target))
    }

    fn try_activate(&self, target: bool) -> Result<(), SwitchError> {
        let mut transition = self
            .transition
            .lock()
            .map_err(|_| SwitchError::Poisoned)?;

        if transition.active != Some(target) {
            let collector = if target {
                Arc::clone(&self.shared.active)
            } else {
                Arc::clone(&self.inactive)
            };
            self.shared
                .bound
                .store(Arc::new(Binding::new(Some(target), collector)));
            transition.active = Some(target);
            tracing::debug!(active = target, "duecredit collector rebound");
        }

        if target && !transition.setup_done {
            match panic::catch_unwind(AssertUnwindSafe(|| self.prepare_exit_and_injections())) {
                Ok(Ok(())) => tracing::debug!("duecredit exit dump and injections armed"),
                Ok(Err(e)) => tracing::error!("failed to prepare injections etc: {e}"),
                Err(payload) => tracing::error!(
                    "failed to prepare injections etc: {}",
                    panic_message(payload.as_ref())
                ),
            }
            transition.setup_done = true;
        }
        Ok(())
    }

    fn prepare_exit_and_injections(&self) -> Result<(), SetupError> {
        let shared = Arc::clone(&self.shared);
        self.exit
            .register(Box::new(move || shared.dump(&DumpOptions::new())))?;
        self.injector.activate(Arc::clone(&self.shared.active))
    }

    /// Summarize the active collector. Does nothing unless active.
    pub fn dump(&self, options: &DumpOptions) {
        self.shared.dump(options)
    }

    pub fn add(&self, entry: Entry) {
        let binding = self.shared.bound.load();
        never_fail_default("add", || binding.collector.add(entry))
    }

    pub fn cite(&self, citation: Citation) {
        let binding = self.shared.bound.load();
        never_fail_default("cite", || binding.collector.cite(citation))
    }

    /// Add `entry` and cite it in one step; the citation's key is taken from
    /// the entry.
    pub fn cite_entry(&self, entry: Entry, mut citation: Citation) {
        let binding = self.shared.bound.load();
        never_fail_default("cite", || {
            citation.entry_key = entry.key.clone();
            binding.collector.add(entry)?;
            binding.collector.cite(citation)
        })
    }

    pub fn load(&self, entries: Vec<Entry>) -> usize {
        let binding = self.shared.bound.load();
        never_fail_default("load", || binding.collector.load(entries))
    }

    pub fn entries(&self) -> Vec<Entry> {
        let binding = self.shared.bound.load();
        never_fail_default("entries", || binding.collector.entries())
    }

    pub fn citations(&self) -> Vec<Citation> {
        let binding = self.shared.bound.load();
        never_fail_default("citations", || binding.collector.citations())
    }

    /// Copy of everything recorded so far; empty while inactive.
    pub fn snapshot(&self) -> CollectorState {
        let binding = self.shared.bound.load();
        never_fail_default("snapshot", || binding.collector.snapshot())
    }
}

impl fmt::Debug for DueSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let binding = self.shared.bound.load();
        f.debug_struct("DueSwitch")
            .field("active", &binding.state)
            .field("collector", &binding.collector)
            .field("setup_done", &self.is_setup_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{
        ActiveCollector, COLLECTOR_OPERATIONS, CollectorError, InactiveCollector,
        Result as CResult,
    };
    use crate::summary::Summary;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingInjector {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Injector for CountingInjector {
        fn activate(&self, _collector: Arc<dyn Collector>) -> Result<(), SetupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SetupError::Injection("simulated".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct CountingSummary {
        builds: AtomicUsize,
    }

    struct Noop;

    impl Summary for Noop {
        fn dump(&self) -> Result<(), SummaryError> {
            Ok(())
        }
    }

    impl SummaryBuilder for CountingSummary {
        fn build(
            &self,
            _collector: &dyn Collector,
            _options: &DumpOptions,
        ) -> Result<Box<dyn Summary>, SummaryError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Noop))
        }
    }

    /// Collector whose every operation fails; `panics` makes them panic instead.
    #[derive(Debug)]
    struct BrokenCollector {
        panics: bool,
    }

    impl BrokenCollector {
        fn fail<T>(&self) -> CResult<T> {
            if self.panics {
                panic!("broken collector");
            }
            Err(CollectorError::Other("broken".to_string()))
        }
    }

    impl Collector for BrokenCollector {
        fn is_active(&self) -> bool {
            true
        }
        fn add(&self, _entry: Entry) -> CResult<()> {
            self.fail()
        }
        fn cite(&self, _citation: Citation) -> CResult<()> {
            self.fail()
        }
        fn load(&self, _entries: Vec<Entry>) -> CResult<usize> {
            self.fail()
        }
        fn entries(&self) -> CResult<Vec<Entry>> {
            self.fail()
        }
        fn citations(&self) -> CResult<Vec<Citation>> {
            self.fail()
        }
        fn snapshot(&self) -> CResult<CollectorState> {
            self.fail()
        }
    }

    struct Fixture {
        hooks: Arc<ShutdownHooks>,
        injector: Arc<CountingInjector>,
        summary: Arc<CountingSummary>,
        active: Arc<ActiveCollector>,
    }

    impl Fixture {
        fn new(fail_injection: bool) -> Self {
            Self {
                hooks: Arc::new(ShutdownHooks::new()),
                injector: Arc::new(CountingInjector {
                    fail: fail_injection,
                    ..Default::default()
                }),
                summary: Arc::new(CountingSummary::default()),
                active: Arc::new(ActiveCollector::new()),
            }
        }

        fn switch(&self, activate: bool) -> DueSwitch {
            let hooks = SwitchHooks::new(
                self.hooks.clone(),
                self.injector.clone(),
                self.summary.clone(),
            );
            DueSwitch::new(
                Some(Arc::new(InactiveCollector::new())),
                Some(self.active.clone()),
                hooks,
                activate,
            )
            .unwrap()
        }

        fn injections(&self) -> usize {
            self.injector.calls.load(Ordering::SeqCst)
        }

        fn builds(&self) -> usize {
            self.summary.builds.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_starts_inactive_without_setup() {
        let fx = Fixture::new(false);
        let due = fx.switch(false);
        assert_eq!(due.active(), Some(false));
        assert!(!due.is_setup_done());
        assert_eq!(fx.hooks.pending(), 0);
        assert_eq!(fx.injections(), 0);
    }

    #[test]
    fn test_setup_runs_exactly_once() {
        let fx = Fixture::new(false);
        let due = fx.switch(false);
        due.activate(true);
        due.activate(true);
        due.activate(false);
        due.activate(true);

        assert_eq!(fx.injections(), 1);
        assert_eq!(fx.hooks.pending(), 1);
        assert!(due.is_setup_done());
        assert_eq!(due.active(), Some(true));
    }

    #[test]
    fn test_failed_setup_is_not_retried() {
        let fx = Fixture::new(true);
        let due = fx.switch(true);
        assert!(due.is_setup_done());
        due.activate(false);
        due.activate(true);
        assert_eq!(fx.injections(), 1);
        assert_eq!(due.active(), Some(true));
    }

    #[test]
    fn test_setup_fails_when_shutdown_already_ran() {
        let fx = Fixture::new(false);
        fx.hooks.run();
        let due = fx.switch(true);
        assert!(due.is_setup_done());
        assert_eq!(due.active(), Some(true));
        // Registration failed first, so the injector was never reached.
        assert_eq!(fx.injections(), 0);
    }

    /// Stub that only offers the query operations.
    #[derive(Debug)]
    struct QueryOnly;

    impl Collector for QueryOnly {
        fn is_active(&self) -> bool {
            false
        }
        fn operations(&self) -> &'static [&'static str] {
            &["citations", "entries"]
        }
        fn add(&self, _entry: Entry) -> CResult<()> {
            Ok(())
        }
        fn cite(&self, _citation: Citation) -> CResult<()> {
            Ok(())
        }
        fn load(&self, _entries: Vec<Entry>) -> CResult<usize> {
            Ok(0)
        }
        fn entries(&self) -> CResult<Vec<Entry>> {
            Ok(Vec::new())
        }
        fn citations(&self) -> CResult<Vec<Citation>> {
            Ok(Vec::new())
        }
        fn snapshot(&self) -> CResult<CollectorState> {
            Ok(CollectorState::default())
        }
    }

    fn query_only_switch(fx: &Fixture) -> DueSwitch {
        DueSwitch::new(
            Some(Arc::new(QueryOnly)),
            Some(fx.active.clone()),
            SwitchHooks::new(fx.hooks.clone(), fx.injector.clone(), fx.summary.clone()),
            false,
        )
        .unwrap()
    }

    /// Call the switch operation named `op`.
    fn invoke(due: &DueSwitch, op: &str) {
        match op {
            "add" => due.add(Entry::text("k", "text")),
            "cite" => due.cite(Citation::new("k", "pkg")),
            "citations" => {
                due.citations();
            }
            "entries" => {
                due.entries();
            }
            "load" => {
                due.load(vec![Entry::text("k", "text")]);
            }
            "snapshot" => {
                due.snapshot();
            }
            other => panic!("switch has no operation {other:?}"),
        }
    }

    #[test]
    fn test_surface_follows_selected_collector() {
        let fx = Fixture::new(false);
        let due = query_only_switch(&fx);
        assert_eq!(due.surface(), vec!["citations", "entries"]);

        due.activate(true);
        assert_eq!(due.surface(), COLLECTOR_OPERATIONS.to_vec());
        assert!(due.collector().is_active());

        due.activate(false);
        assert_eq!(due.surface(), vec!["citations", "entries"]);
        assert!(!due.collector().is_active());
    }

    #[test]
    fn test_every_surface_name_is_a_switch_operation() {
        let fx = Fixture::new(false);
        let due = fx.switch(false);
        for op in due.surface() {
            invoke(&due, op);
        }
        due.activate(true);
        for op in due.surface() {
            invoke(&due, op);
        }
        assert_eq!(due.snapshot().entries.len(), 1);
        assert_eq!(due.citations().len(), 1);
    }

    #[test]
    fn test_surface_never_contains_reserved_or_internal_names() {
        let surface = bound_surface(&["_merge_citation", "activate", "active", "add", "dump"]);
        assert_eq!(surface, vec!["add"]);
        for reserved in RESERVED_NAMES {
            assert!(!bound_surface(COLLECTOR_OPERATIONS).contains(&reserved));
        }
    }

    #[test]
    fn test_operations_are_noops_while_inactive() {
        let fx = Fixture::new(false);
        let due = fx.switch(false);
        due.cite_entry(Entry::doi("a", "10.1/a"), Citation::new("", "pkg"));
        assert!(due.citations().is_empty());
        assert!(fx.active.citations().unwrap().is_empty());
    }

    #[test]
    fn test_operations_record_while_active() {
        let fx = Fixture::new(false);
        let due = fx.switch(true);
        due.cite_entry(Entry::doi("a", "10.1/a"), Citation::new("", "pkg:f"));
        assert_eq!(due.load(vec![Entry::text("b", "b")]), 1);

        let cites = due.citations();
        assert_eq!(cites.len(), 1);
        assert_eq!(cites[0].entry_key, "a");
        assert_eq!(due.entries().len(), 2);
    }

    #[test]
    fn test_missing_collector_is_configuration_error() {
        let err = DueSwitch::new(
            None,
            Some(Arc::new(ActiveCollector::new())),
            SwitchHooks::default(),
            false,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, SwitchError::Configuration { .. }));
        assert!(msg.contains("inactive=None"), "{msg}");
        assert!(msg.contains("ActiveCollector"), "{msg}");

        let err = DueSwitch::new(
            Some(Arc::new(InactiveCollector::new())),
            None,
            SwitchHooks::default(),
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("active=None"));
    }

    #[test]
    fn test_dump_noop_unless_active() {
        let fx = Fixture::new(false);
        let due = fx.switch(false);
        due.dump(&DumpOptions::new());
        assert_eq!(fx.builds(), 0);

        due.activate(true);
        due.dump(&DumpOptions::new().with("outputs", "text"));
        assert_eq!(fx.builds(), 1);
    }

    #[test]
    fn test_exit_hook_dumps_once() {
        let fx = Fixture::new(false);
        let due = fx.switch(true);
        due.activate(true);
        fx.hooks.run();
        fx.hooks.run();
        assert_eq!(fx.builds(), 1);
        drop(due);
    }

    #[test]
    fn test_exit_hook_skips_dump_after_deactivation() {
        let fx = Fixture::new(false);
        let due = fx.switch(true);
        due.activate(false);
        fx.hooks.run();
        assert_eq!(fx.builds(), 0);
    }

    #[test]
    fn test_stub_in_active_slot_never_dumps() {
        let summary = Arc::new(CountingSummary::default());
        let due = DueSwitch::new(
            Some(Arc::new(InactiveCollector::new())),
            Some(Arc::new(InactiveCollector::new())),
            SwitchHooks::new(
                Arc::new(ShutdownHooks::new()),
                Arc::new(NoopInjector),
                summary.clone(),
            ),
            true,
        )
        .unwrap();
        assert_eq!(due.active(), Some(true));
        due.dump(&DumpOptions::new());
        assert_eq!(summary.builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failing_collector_returns_neutral_values() {
        for panics in [false, true] {
            let due = DueSwitch::new(
                Some(Arc::new(InactiveCollector::new())),
                Some(Arc::new(BrokenCollector { panics })),
                SwitchHooks::default(),
                true,
            )
            .unwrap();
            due.add(Entry::text("a", "a"));
            due.cite(Citation::new("a", "pkg"));
            assert_eq!(due.load(vec![Entry::text("b", "b")]), 0);
            assert!(due.entries().is_empty());
            assert!(due.citations().is_empty());
            due.dump(&DumpOptions::new());
        }
    }

    #[test]
    fn test_collector_failures_are_logged() {
        let broken = |panics| {
            DueSwitch::new(
                Some(Arc::new(InactiveCollector::new())),
                Some(Arc::new(BrokenCollector { panics })),
                SwitchHooks::default(),
                true,
            )
            .unwrap()
        };

        let due = broken(false);
        let logs = crate::test_support::capture_logs(|| due.add(Entry::text("a", "a")));
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("duecredit operation failed"), "{logs}");
        assert!(logs.contains("broken"), "{logs}");

        let due = broken(true);
        let logs = crate::test_support::capture_logs(|| {
            assert!(due.citations().is_empty());
        });
        assert!(logs.contains("ERROR"), "{logs}");
        assert!(logs.contains("duecredit operation panicked"), "{logs}");
        assert!(logs.contains("broken collector"), "{logs}");
    }

    #[test]
    fn test_concurrent_readers_see_whole_surfaces() {
        let fx = Fixture::new(false);
        let due = Arc::new(query_only_switch(&fx));
        let inactive = bound_surface(QueryOnly.operations());
        let active = bound_surface(COLLECTOR_OPERATIONS);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let due = Arc::clone(&due);
                let (inactive, active) = (inactive.clone(), active.clone());
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let s = due.surface();
                        assert!(s == inactive || s == active, "torn surface: {s:?}");
                    }
                })
            })
            .collect();

        for i in 0..200 {
            due.activate(i % 2 == 0);
        }
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(fx.injections(), 1);
    }
}
