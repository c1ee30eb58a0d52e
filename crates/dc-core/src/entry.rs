use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TAG;

/// Body of a citation target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum EntryBody {
    Doi(String),
    BibTeX(String),
    Url(String),
    Text(String),
}

/// Something that can be cited: a paper, a software release, a web page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub body: EntryBody,
}

impl Entry {
    pub fn doi(key: &str, doi: &str) -> Self {
        Self::new(key, EntryBody::Doi(doi.to_string()))
    }

    pub fn bibtex(key: &str, bibtex: &str) -> Self {
        Self::new(key, EntryBody::BibTeX(bibtex.to_string()))
    }

    pub fn url(key: &str, url: &str) -> Self {
        Self::new(key, EntryBody::Url(url.to_string()))
    }

    pub fn text(key: &str, text: &str) -> Self {
        Self::new(key, EntryBody::Text(text.to_string()))
    }

    pub fn new(key: &str, body: EntryBody) -> Self {
        Self {
            key: key.to_string(),
            body,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            EntryBody::Doi(doi) => write!(f, "doi:{doi}"),
            EntryBody::BibTeX(_) => write!(f, "bibtex:{}", self.key),
            EntryBody::Url(url) => write!(f, "{url}"),
            EntryBody::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Record that code at `path` used the entry `entry_key`.
///
/// `path` follows the `module.sub:function` convention; a path without `:`
/// names a whole module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub entry_key: String,
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub cite_module: bool,
}

impl Citation {
    pub fn new(entry_key: &str, path: &str) -> Self {
        Self {
            entry_key: entry_key.to_string(),
            path: path.to_string(),
            description: None,
            version: None,
            tags: vec![DEFAULT_TAG.to_string()],
            cite_module: false,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Replace the tag set. An empty set falls back to the default tag.
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = if tags.is_empty() {
            vec![DEFAULT_TAG.to_string()]
        } else {
            tags.iter().map(|t| t.to_string()).collect()
        };
        self
    }

    pub fn module_level(mut self) -> Self {
        self.cite_module = true;
        self
    }

    /// Top-level package name: everything before the first `.` or `:`.
    pub fn package(&self) -> &str {
        self.path
            .split(['.', ':'])
            .next()
            .unwrap_or(self.path.as_str())
    }

    /// True when the path points at a function or method rather than a module.
    pub fn is_function(&self) -> bool {
        self.path.contains(':')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_defaults_to_implementation_tag() {
        let c = Citation::new("k", "pkg.mod:func");
        assert_eq!(c.tags, vec!["implementation".to_string()]);
        assert!(!c.cite_module);
    }

    #[test]
    fn test_empty_tags_fall_back_to_default() {
        let c = Citation::new("k", "pkg").with_tags(&[]);
        assert_eq!(c.tags, vec!["implementation".to_string()]);
        let c = Citation::new("k", "pkg").with_tags(&["edu", "reference"]);
        assert_eq!(c.tags, vec!["edu".to_string(), "reference".to_string()]);
    }

    #[test]
    fn test_package_and_kind() {
        let f = Citation::new("k", "numpy.linalg:solve");
        assert_eq!(f.package(), "numpy");
        assert!(f.is_function());

        let m = Citation::new("k", "scipy");
        assert_eq!(m.package(), "scipy");
        assert!(!m.is_function());
    }

    #[test]
    fn test_entry_json_shape() {
        let e = Entry::doi("smith2020", "10.1000/xyz");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["key"], "smith2020");
        assert_eq!(json["body"]["kind"], "doi");
        assert_eq!(json["body"]["value"], "10.1000/xyz");
    }

    #[test]
    fn test_entry_display() {
        assert_eq!(Entry::doi("a", "10.1/x").to_string(), "doi:10.1/x");
        assert_eq!(Entry::bibtex("b", "@article{b}").to_string(), "bibtex:b");
        assert_eq!(Entry::url("c", "https://x.org").to_string(), "https://x.org");
    }
}
