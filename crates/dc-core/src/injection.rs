//! Injection hands the active collector to whatever instruments host code.
//!
//! How targets are found and wrapped is up to the [`Injector`]; the switch
//! only calls [`Injector::activate`] once, with the active collector.

use std::sync::{Arc, Mutex};

use crate::collector::Collector;
use crate::entry::{Citation, Entry};
use crate::exit::SetupError;

pub trait Injector: Send + Sync {
    fn activate(&self, collector: Arc<dyn Collector>) -> Result<(), SetupError>;
}

/// Injector that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInjector;

impl Injector for NoopInjector {
    fn activate(&self, _collector: Arc<dyn Collector>) -> Result<(), SetupError> {
        Ok(())
    }
}

/// A citation to attach to a module known to be in use.
#[derive(Debug, Clone)]
pub struct Injection {
    pub entry: Entry,
    pub path: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl Injection {
    pub fn new(entry: Entry, path: &str) -> Self {
        Self {
            entry,
            path: path.to_string(),
            description: None,
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    fn citation(&self) -> Citation {
        let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        let citation = Citation::new(&self.entry.key, &self.path)
            .with_tags(&tags)
            .module_level();
        match &self.description {
            Some(d) => citation.with_description(d),
            None => citation,
        }
    }
}

/// Records a fixed set of module-level citations on activation.
///
/// The host registers injections up front; they are cited against the
/// collector handed over at activation. Injections added afterwards are cited
/// immediately.
#[derive(Default)]
pub struct CitationInjector {
    injections: Mutex<Vec<Injection>>,
    collector: Mutex<Option<Arc<dyn Collector>>>,
}

impl CitationInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, injection: Injection) -> Self {
        if let Ok(mut injections) = self.injections.lock() {
            injections.push(injection);
        }
        self
    }

    pub fn add(&self, injection: Injection) -> Result<(), SetupError> {
        let collector = self
            .collector
            .lock()
            .map_err(|_| SetupError::Injection("injector state poisoned".to_string()))?
            .clone();
        if let Some(collector) = collector {
            apply(collector.as_ref(), &injection)?;
        }
        self.injections
            .lock()
            .map_err(|_| SetupError::Injection("injector state poisoned".to_string()))?
            .push(injection);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.collector.lock().map(|c| c.is_some()).unwrap_or(false)
    }
}

fn apply(collector: &dyn Collector, injection: &Injection) -> Result<(), SetupError> {
    collector
        .add(injection.entry.clone())
        .and_then(|_| collector.cite(injection.citation()))
        .map_err(|e| SetupError::Injection(format!("{}: {e}", injection.path)))
}

impl Injector for CitationInjector {
    fn activate(&self, collector: Arc<dyn Collector>) -> Result<(), SetupError> {
        let injections = self
            .injections
            .lock()
            .map_err(|_| SetupError::Injection("injector state poisoned".to_string()))?
            .clone();

        let mut failed = Vec::new();
        for injection in &injections {
            if let Err(e) = apply(collector.as_ref(), injection) {
                failed.push(e.to_string());
            }
        }

        *self
            .collector
            .lock()
            .map_err(|_| SetupError::Injection("injector state poisoned".to_string()))? =
            Some(collector);

        tracing::debug!(
            injected = injections.len() - failed.len(),
            failed = failed.len(),
            "injector activated"
        );
        if failed.is_empty() {
            Ok(())
        } else {
            Err(SetupError::Injection(failed.join("; ")))
        }
    }
}
