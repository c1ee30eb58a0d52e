//! Lazy, cached version lookup for named components.
//!
//! A component is resolved through a [`ComponentResolver`]. Names that do not
//! resolve are reported as absent and never cached. Components that resolve
//! but expose no usable version are cached as [`VersionValue::Unknown`], which
//! counts as "present" yet refuses to be ordered against anything but itself.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{LazyLock, Mutex, MutexGuard};

use regex::Regex;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*v?
        (?P<release>\d+(?:\.\d+)*)
        (?:[-_.]?(?P<pre>alpha|a|beta|b|preview|pre|rc|c)[-_.]?(?P<pre_n>\d+)?)?
        (?:[-_.]?(?P<post_mark>post|rev)[-_.]?(?P<post>\d+)?)?
        (?:[-_.]?(?P<dev_mark>dev)[-_.]?(?P<dev>\d+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// An `UNKNOWN` version was ordered against something other than itself.
    Incomparable { left: String, right: String },
    Parse(String),
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::Incomparable { left, right } => {
                write!(f, "cannot order {left} against {right}")
            }
            VersionError::Parse(s) => write!(f, "unparseable version: {s:?}"),
        }
    }
}

impl std::error::Error for VersionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "a" | "alpha" => PreRelease::Alpha,
            "b" | "beta" => PreRelease::Beta,
            _ => PreRelease::Rc,
        }
    }

    fn label(self) -> &'static str {
        match self {
            PreRelease::Alpha => "a",
            PreRelease::Beta => "b",
            PreRelease::Rc => "rc",
        }
    }
}

/// A comparable version: dotted numeric release with optional pre-release,
/// post-release and development suffixes.
#[derive(Debug, Clone)]
pub struct Version {
    release: Vec<u64>,
    pre: Option<(PreRelease, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<String>,
}

impl Version {
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| VersionError::Parse(s.to_string()))?;

        let number = |name: &str| -> Result<Option<u64>, VersionError> {
            caps.name(name)
                .map(|m| {
                    m.as_str()
                        .parse::<u64>()
                        .map_err(|_| VersionError::Parse(s.to_string()))
                })
                .transpose()
        };

        let release = caps["release"]
            .split('.')
            .map(|p| p.parse::<u64>().map_err(|_| VersionError::Parse(s.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.name("pre") {
            Some(m) => Some((PreRelease::parse(m.as_str()), number("pre_n")?.unwrap_or(0))),
            None => None,
        };

        // `post`/`dev` may appear without a number; their presence is what counts.
        let post = match caps.name("post_mark") {
            Some(_) => Some(number("post")?.unwrap_or(0)),
            None => None,
        };
        let dev = match caps.name("dev_mark") {
            Some(_) => Some(number("dev")?.unwrap_or(0)),
            None => None,
        };

        Ok(Self {
            release,
            pre,
            post,
            dev,
            local: caps.name("local").map(|m| m.as_str().to_lowercase()),
        })
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    fn significant_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&n| n != 0)
            .map_or(0, |i| i + 1);
        &self.release[..end]
    }

    fn sort_key(&self) -> (&[u64], (u8, Option<PreRelease>, u64), Option<u64>, (u8, u64)) {
        // A bare `.devN` sorts below every pre-release of the same release.
        let phase = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (0, None, 0),
            (Some((kind, n)), _, _) => (1, Some(kind), n),
            (None, _, _) => (2, None, 0),
        };
        let dev = match self.dev {
            Some(n) => (0, n),
            None => (1, 0),
        };
        (self.significant_release(), phase, self.post, dev)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl std::str::FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((kind, n)) = self.pre {
            write!(f, "{}{n}", kind.label())?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{n}")?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{n}")?;
        }
        if let Some(local) = &self.local {
            write!(f, "+{local}")?;
        }
        Ok(())
    }
}

/// Cached answer for a resolved component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionValue {
    Known(Version),
    /// Component present, version undeterminable.
    Unknown,
}

impl VersionValue {
    /// Always true: a value only exists for components that were found.
    pub fn is_present(&self) -> bool {
        true
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            VersionValue::Known(v) => Some(v),
            VersionValue::Unknown => None,
        }
    }

    pub fn try_cmp(&self, other: &VersionValue) -> Result<Ordering, VersionError> {
        match (self, other) {
            (VersionValue::Known(a), VersionValue::Known(b)) => Ok(a.cmp(b)),
            (VersionValue::Unknown, VersionValue::Unknown) => Ok(Ordering::Equal),
            _ => Err(VersionError::Incomparable {
                left: self.to_string(),
                right: other.to_string(),
            }),
        }
    }

    pub fn try_cmp_str(&self, other: &str) -> Result<Ordering, VersionError> {
        match self {
            VersionValue::Known(a) => Ok(a.cmp(&Version::parse(other)?)),
            VersionValue::Unknown => Err(VersionError::Incomparable {
                left: self.to_string(),
                right: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for VersionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionValue::Known(v) => write!(f, "{v}"),
            VersionValue::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl PartialOrd for VersionValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl PartialEq<Version> for VersionValue {
    fn eq(&self, other: &Version) -> bool {
        self.as_version() == Some(other)
    }
}

impl PartialOrd<Version> for VersionValue {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        self.as_version().map(|v| v.cmp(other))
    }
}

impl PartialEq<&str> for VersionValue {
    fn eq(&self, other: &&str) -> bool {
        self.try_cmp_str(other) == Ok(Ordering::Equal)
    }
}

impl PartialOrd<&str> for VersionValue {
    fn partial_cmp(&self, other: &&str) -> Option<Ordering> {
        self.try_cmp_str(other).ok()
    }
}

/// A component the resolver knows about, optionally carrying a raw version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    pub name: String,
    pub version: Option<String>,
}

impl ComponentInfo {
    pub fn new(name: &str, version: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            version: version.map(str::to_string),
        }
    }
}

/// Finds components by name.
pub trait ComponentResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<ComponentInfo>;
}

/// Resolver backed by components the host registers up front.
#[derive(Debug, Default, Clone)]
pub struct StaticRegistry {
    components: BTreeMap<String, Option<String>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that already knows this crate.
    pub fn with_self() -> Self {
        let mut registry = Self::new();
        registry.register(env!("CARGO_PKG_NAME"), Some(env!("CARGO_PKG_VERSION")));
        registry
    }

    pub fn register(&mut self, name: &str, version: Option<&str>) -> &mut Self {
        self.components
            .insert(name.to_string(), version.map(str::to_string));
        self
    }
}

impl ComponentResolver for StaticRegistry {
    fn resolve(&self, name: &str) -> Option<ComponentInfo> {
        self.components
            .get(name)
            .map(|v| ComponentInfo::new(name, v.as_deref()))
    }
}

/// What to look up: a name to resolve, or an already-resolved component.
pub enum ComponentQuery<'a> {
    Name(&'a str),
    Handle(&'a ComponentInfo),
}

impl<'a> From<&'a str> for ComponentQuery<'a> {
    fn from(name: &'a str) -> Self {
        ComponentQuery::Name(name)
    }
}

impl<'a> From<&'a String> for ComponentQuery<'a> {
    fn from(name: &'a String) -> Self {
        ComponentQuery::Name(name.as_str())
    }
}

impl<'a> From<&'a ComponentInfo> for ComponentQuery<'a> {
    fn from(info: &'a ComponentInfo) -> Self {
        ComponentQuery::Handle(info)
    }
}

/// Cached versions of external components.
pub struct ExternalVersions {
    resolver: Box<dyn ComponentResolver>,
    versions: Mutex<BTreeMap<String, VersionValue>>,
}

impl ExternalVersions {
    pub const UNKNOWN: VersionValue = VersionValue::Unknown;

    pub fn new(resolver: impl ComponentResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            versions: Mutex::new(BTreeMap::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, BTreeMap<String, VersionValue>> {
        // The map holds plain values; a panic elsewhere cannot leave it torn.
        self.versions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Version of `component`, or `None` when it cannot be resolved.
    pub fn get<'a>(&self, component: impl Into<ComponentQuery<'a>>) -> Option<VersionValue> {
        let resolved;
        let info = match component.into() {
            ComponentQuery::Name(name) => {
                if let Some(v) = self.cache().get(name) {
                    return Some(v.clone());
                }
                resolved = self.resolver.resolve(name)?;
                &resolved
            }
            ComponentQuery::Handle(info) => info,
        };

        let mut cache = self.cache();
        if let Some(v) = cache.get(&info.name) {
            return Some(v.clone());
        }
        let value = deduce_version(info);
        cache.insert(info.name.clone(), value.clone());
        Some(value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cache().contains_key(name)
    }

    pub fn keys(&self) -> Vec<String> {
        self.cache().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache().is_empty()
    }

    /// Copy of the cached mapping.
    pub fn versions(&self) -> BTreeMap<String, VersionValue> {
        self.cache().clone()
    }

    pub fn dumps(&self, indent: bool) -> String {
        self.dumps_with(indent, "Versions:")
    }

    pub fn dumps_with(&self, indent: bool, preamble: &str) -> String {
        let items: Vec<String> = self
            .cache()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        if indent {
            let mut out = format!("{preamble}\n");
            for item in items {
                out.push(' ');
                out.push_str(&item);
                out.push('\n');
            }
            out
        } else if items.is_empty() {
            preamble.to_string()
        } else {
            format!("{preamble} {}", items.join(", "))
        }
    }
}

impl Default for ExternalVersions {
    fn default() -> Self {
        Self::new(StaticRegistry::with_self())
    }
}

impl fmt::Debug for ExternalVersions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalVersions")
            .field("versions", &*self.cache())
            .finish_non_exhaustive()
    }
}

fn deduce_version(info: &ComponentInfo) -> VersionValue {
    match info.version.as_deref() {
        Some(raw) => match Version::parse(raw) {
            Ok(v) => VersionValue::Known(v),
            Err(e) => {
                tracing::debug!(component = %info.name, "{e}; recording as UNKNOWN");
                VersionValue::Unknown
            }
        },
        None => VersionValue::Unknown,
    }
}
