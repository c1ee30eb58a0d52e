use std::collections::BTreeMap;
use std::fmt;

use crate::collector::Collector;

/// Open bag of named options for a summary builder.
///
/// The switch passes it through untouched; which keys mean something is up
/// to the builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpOptions {
    options: BTreeMap<String, String>,
}

impl DumpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Boolean option accepting `1/0`, `yes/no`, `true/false`.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(crate::config::parse_bool)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }
}

#[derive(Debug)]
pub struct SummaryError(pub String);

impl fmt::Display for SummaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "summary failed: {}", self.0)
    }
}

impl std::error::Error for SummaryError {}

pub trait Summary {
    fn dump(&self) -> Result<(), SummaryError>;
}

pub trait SummaryBuilder: Send + Sync {
    fn build(
        &self,
        collector: &dyn Collector,
        options: &DumpOptions,
    ) -> Result<Box<dyn Summary>, SummaryError>;
}

/// Builder whose summaries do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSummaryBuilder;

struct NullSummary;

impl Summary for NullSummary {
    fn dump(&self) -> Result<(), SummaryError> {
        Ok(())
    }
}

impl SummaryBuilder for NullSummaryBuilder {
    fn build(
        &self,
        _collector: &dyn Collector,
        _options: &DumpOptions,
    ) -> Result<Box<dyn Summary>, SummaryError> {
        Ok(Box::new(NullSummary))
    }
}
