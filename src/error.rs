//! Error types for the registration analytics pipeline.
//!
//! Three layers, matching how far a failure is allowed to travel:
//! - `ConfigError` is fatal at startup.
//! - `LoadError` never leaves the loader; it is logged and recorded against
//!   the file that produced it.
//! - `PipelineError` is what `pipeline::run` hands back to a binary.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::Category;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("canonical column '{name}' is produced by both {first} and {second}")]
    CanonicalCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("canonical column '{name}' in the {category} schema shadows a derived column")]
    ReservedName { name: String, category: Category },

    #[error("{category} schema must provide the '{name}' bucket")]
    MissingRequiredBucket { name: &'static str, category: Category },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// A single input file that could not be used.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} has no '{column}' column")]
    MissingKeyColumn { path: PathBuf, column: &'static str },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no input data: none of the enrolment, biometric or demographic categories produced any rows under {0}")]
    NoData(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to serialize run summary: {0}")]
    Summary(#[from] serde_json::Error),

    #[error("failed to render report: {0}")]
    Render(#[from] std::fmt::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
