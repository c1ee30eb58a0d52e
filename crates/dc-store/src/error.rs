use std::fmt;
use std::path::PathBuf;

use dc_core::CollectorError;

#[derive(Debug)]
pub enum StoreError {
    Io(PathBuf, std::io::Error),
    Json(serde_json::Error),
    UnsupportedFormat(String),
    Collector(CollectorError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(path, e) => write!(f, "I/O error on {}: {e}", path.display()),
            StoreError::Json(e) => write!(f, "invalid state JSON: {e}"),
            StoreError::UnsupportedFormat(v) => write!(f, "unsupported state format version: {v}"),
            StoreError::Collector(e) => write!(f, "collector error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

impl From<CollectorError> for StoreError {
    fn from(e: CollectorError) -> Self {
        StoreError::Collector(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
