//! Error types for catalog conversion and reference-object loading.
//!
//! | Variant | Raised by | Recoverable? |
//! |---------|-----------|--------------|
//! | [`Configuration`](RefcatError::Configuration) | Loader/converter setup, missing epoch | No |
//! | [`UnknownFilter`](RefcatError::UnknownFilter) | Filter resolution against the stored schema | No |
//! | [`MalformedRecord`](RefcatError::MalformedRecord) | Converter input rows (skipped and counted) | No |
//! | [`DuplicateId`](RefcatError::DuplicateId) | Converter id-uniqueness pass | No |
//! | [`ShardLoad`](RefcatError::ShardLoad) | Shard materialization during a query | Yes |
//! | [`Io`](RefcatError::Io) | File system access | Yes |
//!
//! Recoverable here means a caller may retry the same call later; the engine
//! itself never retries.

use std::path::{Path, PathBuf};

use celestial_sky::{CellId, SkyError};
use thiserror::Error;

pub type RefcatResult<T> = Result<T, RefcatError>;

#[derive(Debug, Error)]
pub enum RefcatError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unknown filter '{requested}' (resolved to '{resolved}'); available: {available:?}")]
    UnknownFilter {
        requested: String,
        resolved: String,
        available: Vec<String>,
    },

    #[error("Malformed record in {source_name} line {line}: {message}")]
    MalformedRecord {
        source_name: String,
        line: u64,
        message: String,
    },

    #[error("Duplicate id {id}: first seen in {first}, again in {second}")]
    DuplicateId {
        id: i64,
        first: String,
        second: String,
    },

    #[error("Failed to load shard for cell {cell}: {message}")]
    ShardLoad { cell: CellId, message: String },

    #[error("Invalid shard data: {message}")]
    ShardFormat { message: String },

    #[error("Output already exists: {}", path.display())]
    OutputExists { path: PathBuf },

    #[error("Index error: {message}")]
    Index { message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sky(#[from] SkyError),

    #[error("Determiner '{name}' is already registered")]
    DuplicateDeterminer { name: String },

    #[error("No determiner registered under '{name}'")]
    UnknownDeterminer { name: String },

    #[error("PSF determination failed: {message}")]
    Determination { message: String },
}

impl RefcatError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn malformed_record(source_name: impl Into<String>, line: u64, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }

    pub fn shard_load(cell: CellId, message: impl Into<String>) -> Self {
        Self::ShardLoad {
            cell,
            message: message.into(),
        }
    }

    pub fn shard_format(message: impl Into<String>) -> Self {
        Self::ShardFormat {
            message: message.into(),
        }
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn determination(message: impl Into<String>) -> Self {
        Self::Determination {
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ShardLoad { .. } | Self::Io { .. })
    }
}
