//! Boundary error type.
//!
//! Everything past this boundary is "errors are data" (§9): operation
//! results carry `warning`/`error` fields instead of propagating a `Result`.
//! `MemlobeError` only covers failures that occur *before* such a result
//! type exists to carry them — file I/O, directory scans, config parsing.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemlobeError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("lobe '{0}' is unknown")]
    UnknownLobe(String),

    #[error("lobe '{0}' is degraded: {1}")]
    DegradedLobe(String, String),

    #[error("no lobes configured")]
    NoLobes,
}

pub type Result<T> = std::result::Result<T, MemlobeError>;

pub(crate) fn io_err(path: &std::path::Path, source: std::io::Error) -> MemlobeError {
    MemlobeError::Io {
        path: path.to_path_buf(),
        source,
    }
}
