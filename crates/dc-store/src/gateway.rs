//! JSON state file: load what earlier runs collected, save what this run adds.
//!
//! The file carries a format version next to the collector state:
//! `{"version": "1", "entries": {...}, "citations": [...]}`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use dc_core::{ActiveCollector, Collector, CollectorState, never_fail_with};

use crate::error::{Result, StoreError};

pub const FORMAT_VERSION: &str = "1";

#[derive(Serialize, Deserialize)]
struct StateFile {
    version: String,
    #[serde(flatten)]
    state: CollectorState,
}

/// Result of looking for previously persisted state.
#[derive(Debug)]
pub enum LoadOutcome {
    /// No state file; start empty.
    Fresh(ActiveCollector),
    /// State file found and resumed.
    Loaded(ActiveCollector),
    /// State file unreadable; instrumentation stays off for this run.
    Disabled,
}

/// Read a state file. `Ok(None)` when nothing exists at `path`.
pub fn load_state(path: &Path) -> Result<Option<CollectorState>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path).map_err(|e| StoreError::Io(path.to_path_buf(), e))?;
    parse_state(&json).map(Some)
}

pub fn parse_state(json: &str) -> Result<CollectorState> {
    let file: StateFile = serde_json::from_str(json)?;
    if file.version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedFormat(file.version));
    }
    Ok(file.state)
}

pub fn load_or_create(path: &Path) -> LoadOutcome {
    match load_state(path) {
        Ok(None) => LoadOutcome::Fresh(ActiveCollector::new()),
        Ok(Some(state)) => {
            tracing::debug!(
                path = %path.display(),
                citations = state.citations.len(),
                "resumed collected citations"
            );
            LoadOutcome::Loaded(ActiveCollector::from_state(state))
        }
        Err(e) => {
            tracing::warn!(
                "failed to load previously collected {}: {e}. \
                 DueCredit will not be active for this session.",
                path.display()
            );
            LoadOutcome::Disabled
        }
    }
}

/// Collector for the active slot of the switch: the resumed or fresh
/// collector, or `fallback` when the state file is unusable or anything
/// else goes wrong.
pub fn active_collector(path: &Path, fallback: Arc<dyn Collector>) -> Arc<dyn Collector> {
    let on_failure = Arc::clone(&fallback);
    never_fail_with(
        "active collector",
        move || on_failure,
        || -> Result<Arc<dyn Collector>> {
            let collector: Arc<dyn Collector> = match load_or_create(path) {
                LoadOutcome::Fresh(c) | LoadOutcome::Loaded(c) => Arc::new(c),
                LoadOutcome::Disabled => fallback,
            };
            Ok(collector)
        },
    )
}

pub fn persist(collector: &dyn Collector, path: &Path) -> Result<()> {
    persist_state(&collector.snapshot()?, path)
}

/// Write `state` to `path` through a sibling temp file, creating parent
/// directories as needed.
pub fn persist_state(state: &CollectorState, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
    }

    let file = StateFile {
        version: FORMAT_VERSION.to_string(),
        state: state.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;

    let tmp = temp_path(path);
    fs::write(&tmp, json).map_err(|e| StoreError::Io(tmp.clone(), e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::Io(path.to_path_buf(), e))?;
    tracing::debug!(path = %path.display(), "saved collected citations");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "duecredit".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
