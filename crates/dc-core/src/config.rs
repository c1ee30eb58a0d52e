use std::path::PathBuf;

use crate::constants::{DEFAULT_OUTPUTS, DEFAULT_STATE_FILE, ENV_ENABLE, ENV_FILE, ENV_OUTPUTS};

/// Parse a boolean toggle: case-insensitive `1/0`, `yes/no`, `true/false`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" => Some(true),
        "0" | "no" | "false" => Some(false),
        _ => None,
    }
}

/// Interpret the enable toggle. Unset means off; unrecognized values are
/// logged and treated as off.
pub fn parse_enable(value: Option<&str>) -> bool {
    let Some(raw) = value else {
        return false;
    };
    parse_bool(raw).unwrap_or_else(|| {
        tracing::warn!(
            "misunderstood value {raw:?} for {ENV_ENABLE}; use 'yes' or 'no', or '0' or '1'"
        );
        false
    })
}

/// Start-up configuration, read once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub enable: bool,
    pub state_file: PathBuf,
    pub outputs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable: false,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            outputs: split_outputs(DEFAULT_OUTPUTS),
        }
    }
}

impl Config {
    pub fn new(enable: bool) -> Self {
        Self {
            enable,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; `from_env` uses the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enable = parse_enable(lookup(ENV_ENABLE).as_deref());
        let state_file = lookup(ENV_FILE)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));
        let outputs = lookup(ENV_OUTPUTS)
            .map(|s| split_outputs(&s))
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| split_outputs(DEFAULT_OUTPUTS));

        Self {
            enable,
            state_file,
            outputs,
        }
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|o| o.to_string()).collect();
        self
    }
}

/// Split a comma-separated output list, dropping blanks.
pub fn split_outputs(s: &str) -> Vec<String> {
    s.split(',')
        .map(|o| o.trim().to_ascii_lowercase())
        .filter(|o| !o.is_empty())
        .collect()
}
