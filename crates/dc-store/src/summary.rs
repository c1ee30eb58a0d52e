//! Summaries that persist the collector state and render reports.
//!
//! Recognized [`DumpOptions`]:
//! - `outputs`: comma list of `text`, `bibtex`
//! - `filename`: state file to write instead of the configured one
//! - `persist`: `no` to skip writing the state file

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use dc_core::config::split_outputs;
use dc_core::{
    Collector, CollectorState, Config, DumpOptions, EntryBody, Summary, SummaryBuilder,
    SummaryError,
};

use crate::gateway::persist_state;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    BibTeX,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "bibtex" => Some(OutputFormat::BibTeX),
            _ => None,
        }
    }

    pub fn render(self, state: &CollectorState) -> String {
        match self {
            OutputFormat::Text => render_text(state),
            OutputFormat::BibTeX => render_bibtex(state),
        }
    }
}

/// Builds summaries that write the state file and print reports to stderr.
#[derive(Debug, Clone)]
pub struct FileSummaryBuilder {
    state_file: PathBuf,
    outputs: Vec<String>,
}

impl FileSummaryBuilder {
    pub fn new(state_file: impl Into<PathBuf>, outputs: Vec<String>) -> Self {
        Self {
            state_file: state_file.into(),
            outputs,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.state_file.clone(), config.outputs.clone())
    }
}

impl SummaryBuilder for FileSummaryBuilder {
    fn build(
        &self,
        collector: &dyn Collector,
        options: &DumpOptions,
    ) -> Result<Box<dyn Summary>, SummaryError> {
        let state = collector
            .snapshot()
            .map_err(|e| SummaryError(e.to_string()))?;

        let outputs = options
            .get("outputs")
            .map(split_outputs)
            .unwrap_or_else(|| self.outputs.clone());
        let formats = outputs
            .iter()
            .filter_map(|o| {
                let format = OutputFormat::parse(o);
                if format.is_none() {
                    tracing::warn!("unknown duecredit output {o:?}; skipping");
                }
                format
            })
            .collect();

        Ok(Box::new(FileSummary {
            state,
            path: options
                .get("filename")
                .map(PathBuf::from)
                .unwrap_or_else(|| self.state_file.clone()),
            persist: options.flag("persist").unwrap_or(true),
            formats,
        }))
    }
}

pub struct FileSummary {
    state: CollectorState,
    path: PathBuf,
    persist: bool,
    formats: Vec<OutputFormat>,
}

impl FileSummary {
    /// All requested reports, concatenated.
    pub fn render(&self) -> String {
        self.formats
            .iter()
            .map(|f| f.render(&self.state))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Summary for FileSummary {
    fn dump(&self) -> Result<(), SummaryError> {
        if self.persist {
            persist_state(&self.state, &self.path).map_err(|e| SummaryError(e.to_string()))?;
        }
        let report = self.render();
        if !report.is_empty() {
            std::io::stderr()
                .write_all(report.as_bytes())
                .map_err(|e| SummaryError(e.to_string()))?;
        }
        Ok(())
    }
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun} cited")
    } else {
        format!("{n} {noun}s cited")
    }
}

/// Human-readable report: citations grouped by package, then references.
pub fn render_text(state: &CollectorState) -> String {
    let refs: Vec<&str> = state
        .cited_entries()
        .into_iter()
        .map(|e| e.key.as_str())
        .collect();
    let ref_no = |key: &str| refs.iter().position(|k| *k == key).map_or(0, |i| i + 1);

    let mut citations: Vec<_> = state.citations.iter().collect();
    citations.sort_by(|a, b| a.path.cmp(&b.path));

    let mut out = String::from("DueCredit Report:\n");
    for c in &citations {
        let indent = if c.path == c.package() { "" } else { "  " };
        let label = c.description.as_deref().unwrap_or(c.path.as_str());
        let version = c
            .version
            .as_deref()
            .map(|v| format!(" (v {v})"))
            .unwrap_or_default();
        out.push_str(&format!(
            "{indent}- {label} / {}{version} [{}]\n",
            c.path,
            ref_no(&c.entry_key)
        ));
    }

    let packages: BTreeSet<&str> = citations.iter().map(|c| c.package()).collect();
    let functions = citations.iter().filter(|c| c.is_function()).count();
    let modules = citations
        .iter()
        .filter(|c| !c.is_function() && c.path != c.package())
        .count();

    out.push('\n');
    out.push_str(&plural(packages.len(), "package"));
    out.push('\n');
    out.push_str(&plural(modules, "module"));
    out.push('\n');
    out.push_str(&plural(functions, "function"));
    out.push('\n');

    if !refs.is_empty() {
        out.push_str("\nReferences\n----------\n\n");
        for (i, entry) in state.cited_entries().iter().enumerate() {
            let text = match &entry.body {
                EntryBody::BibTeX(_) => entry.key.clone(),
                _ => entry.to_string(),
            };
            out.push_str(&format!("[{}] {text}\n", i + 1));
        }
    }
    out
}

/// BibTeX for every cited entry; non-BibTeX entries become `@misc`.
pub fn render_bibtex(state: &CollectorState) -> String {
    let mut out = String::new();
    for entry in state.cited_entries() {
        let record = match &entry.body {
            EntryBody::BibTeX(raw) => raw.trim().to_string(),
            EntryBody::Doi(doi) => format!("@misc{{{},\n  doi = {{{doi}}}\n}}", entry.key),
            EntryBody::Url(url) => format!("@misc{{{},\n  url = {{{url}}}\n}}", entry.key),
            EntryBody::Text(text) => format!("@misc{{{},\n  note = {{{text}}}\n}}", entry.key),
        };
        out.push_str(&record);
        out.push_str("\n\n");
    }
    out
}
