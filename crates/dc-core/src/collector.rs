//! Collectors accumulate citations.
//!
//! Two variants share one operation surface: [`InactiveCollector`] discards
//! everything, [`ActiveCollector`] records entries and citations in memory
//! until they are persisted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::entry::{Citation, Entry};

#[derive(Debug)]
pub enum CollectorError {
    /// A citation referred to an entry that was never added.
    UnknownEntry(String),
    /// A previous holder of the state lock panicked.
    Poisoned,
    Other(String),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorError::UnknownEntry(key) => write!(f, "unknown entry: {key}"),
            CollectorError::Poisoned => write!(f, "collector state lock poisoned"),
            CollectorError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CollectorError {}

pub type Result<T> = std::result::Result<T, CollectorError>;

/// Serializable snapshot of everything a collector gathered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorState {
    #[serde(default)]
    pub entries: BTreeMap<String, Entry>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl CollectorState {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.citations.is_empty()
    }

    /// Entries referenced by at least one citation, in first-citation order.
    pub fn cited_entries(&self) -> Vec<&Entry> {
        let mut seen = Vec::new();
        for c in &self.citations {
            if let Some(e) = self.entries.get(&c.entry_key)
                && !seen.iter().any(|s: &&Entry| s.key == e.key)
            {
                seen.push(e);
            }
        }
        seen
    }

    fn merge_citation(&mut self, citation: Citation) {
        let existing = self
            .citations
            .iter_mut()
            .find(|c| c.entry_key == citation.entry_key && c.path == citation.path);

        match existing {
            Some(c) => {
                for tag in citation.tags {
                    if !c.tags.contains(&tag) {
                        c.tags.push(tag);
                    }
                }
                if c.description.is_none() {
                    c.description = citation.description;
                }
                if c.version.is_none() {
                    c.version = citation.version;
                }
                c.cite_module |= citation.cite_module;
            }
            None => self.citations.push(citation),
        }
    }
}

/// Names of the [`Collector`] operations, one per trait method below
/// `operations`. The activation switch forwards each of them.
pub const COLLECTOR_OPERATIONS: &[&str] =
    &["add", "cite", "citations", "entries", "load", "snapshot"];

/// Operation surface shared by both collector variants.
///
/// `operations` lists the public operation names a collector offers; the
/// activation switch binds exactly those (minus its reserved names).
pub trait Collector: Send + Sync + fmt::Debug {
    fn is_active(&self) -> bool;

    fn operations(&self) -> &'static [&'static str] {
        COLLECTOR_OPERATIONS
    }

    fn add(&self, entry: Entry) -> Result<()>;

    /// Record a citation. The referenced entry must have been added.
    fn cite(&self, citation: Citation) -> Result<()>;

    /// Bulk-add entries, returning how many were not known before.
    fn load(&self, entries: Vec<Entry>) -> Result<usize>;

    fn entries(&self) -> Result<Vec<Entry>>;

    fn citations(&self) -> Result<Vec<Citation>>;

    fn snapshot(&self) -> Result<CollectorState>;
}

/// No-op collector used whenever instrumentation is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct InactiveCollector;

impl InactiveCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for InactiveCollector {
    fn is_active(&self) -> bool {
        false
    }

    fn add(&self, _entry: Entry) -> Result<()> {
        Ok(())
    }

    fn cite(&self, _citation: Citation) -> Result<()> {
        Ok(())
    }

    fn load(&self, _entries: Vec<Entry>) -> Result<usize> {
        Ok(0)
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        Ok(Vec::new())
    }

    fn citations(&self) -> Result<Vec<Citation>> {
        Ok(Vec::new())
    }

    fn snapshot(&self) -> Result<CollectorState> {
        Ok(CollectorState::default())
    }
}

/// In-memory recording collector.
#[derive(Debug, Default)]
pub struct ActiveCollector {
    state: Mutex<CollectorState>,
}

impl ActiveCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from previously persisted state.
    pub fn from_state(state: CollectorState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CollectorState>> {
        self.state.lock().map_err(|_| CollectorError::Poisoned)
    }
}

impl Collector for ActiveCollector {
    fn is_active(&self) -> bool {
        true
    }

    fn add(&self, entry: Entry) -> Result<()> {
        self.lock()?.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn cite(&self, citation: Citation) -> Result<()> {
        let mut state = self.lock()?;
        if !state.entries.contains_key(&citation.entry_key) {
            return Err(CollectorError::UnknownEntry(citation.entry_key));
        }
        state.merge_citation(citation);
        Ok(())
    }

    fn load(&self, entries: Vec<Entry>) -> Result<usize> {
        let mut state = self.lock()?;
        let mut added = 0;
        for entry in entries {
            if state.entries.insert(entry.key.clone(), entry).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        Ok(self.lock()?.entries.values().cloned().collect())
    }

    fn citations(&self) -> Result<Vec<Citation>> {
        Ok(self.lock()?.citations.clone())
    }

    fn snapshot(&self) -> Result<CollectorState> {
        Ok(self.lock()?.clone())
    }
}
