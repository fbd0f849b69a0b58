//! Error taxonomy shared by every stage of the converter.
//!
//! Pre-flight failures (`PathTraversal`, `FileTooLarge`, `InvalidFileType`,
//! `InputNotFound`, `OutputDirMissing`, `Config`) are raised before the store
//! is touched. Resource-limit failures (`BatchTooLarge`,
//! `RecordLimitExceeded`) and store/serialization failures abort a run.
//! `Aggregation` is the only cell-level error: readers count it and move on.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::progress::Stage;

/// Why a single raw cell was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// `from_landuse` discriminator or destination column is not a known code.
    UnknownLandUse,
    /// Geography key is not a 1–5 digit FIPS code.
    MalformedFips,
    /// Acreage is NaN or infinite.
    NonFiniteValue,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::UnknownLandUse => "unknown land-use code",
            SkipReason::MalformedFips => "malformed FIPS code",
            SkipReason::NonFiniteValue => "non-finite acreage",
        })
    }
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("path traversal rejected: {path}")]
    PathTraversal { path: PathBuf },

    #[error("file too large: {path} is {size} bytes, limit is {limit}")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("invalid file type: {path} (expected {expected})")]
    InvalidFileType { path: PathBuf, expected: String },

    #[error("input file not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("output directory does not exist: {path}")]
    OutputDirMissing { path: PathBuf },

    #[error("batch of {size} rows exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("record limit exceeded: writing {attempted} rows would pass the limit of {limit}")]
    RecordLimitExceeded { attempted: u64, limit: u64 },

    #[error("{reason}: {detail}")]
    Aggregation { reason: SkipReason, detail: String },

    #[error("malformed input: {message}")]
    MalformedInput { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("store error: {0}")]
    Store(#[from] duckdb::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{stage} stage failed")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ConvertError>,
    },
}

pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    pub fn aggregation(reason: SkipReason, detail: impl Into<String>) -> Self {
        Self::Aggregation {
            reason,
            detail: detail.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Attach the failing stage. Already-wrapped errors keep their original stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            err @ ConvertError::Stage { .. } => err,
            other => ConvertError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was raised in, if it has been attached.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ConvertError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, with any stage wrapper removed.
    pub fn root(&self) -> &ConvertError {
        match self {
            ConvertError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for failures raised before the pipeline starts.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self.root(),
            ConvertError::PathTraversal { .. }
                | ConvertError::FileTooLarge { .. }
                | ConvertError::InvalidFileType { .. }
                | ConvertError::InputNotFound { .. }
                | ConvertError::OutputDirMissing { .. }
                | ConvertError::Config { .. }
        )
    }
}
