//! Error types for every stage of the canonicalization pipeline
//!
//! Each stage has its own error enum so callers can match on the failure
//! class. [`CanoniError`] wraps them and records which stage failed.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CanoniError>;

/// Bad `repository:tag` syntax
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid reference format {0:?}: expected REPOSITORY:TAG")]
    InvalidFormat(String),
}

/// Failures while reading an exchange-format archive
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed image archive: {0}")]
    Malformed(String),

    #[error("digest mismatch for {path}: expected {expected}, computed {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("no image matching {0} in archive")]
    NotFound(String),

    #[error("failed to read archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The only way canonicalization can fail
#[derive(Error, Debug)]
pub enum CanonicalizeError {
    #[error("image config is unavailable: {0}")]
    ConfigUnavailable(String),
}

/// Failures while writing an exchange-format archive
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("failed to write archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl EncodeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EncodeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// The external container runtime could not be run or reported failure
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}:\n{output}")]
    Failed {
        command: String,
        status: String,
        output: String,
    },
}

/// Top-level error, one variant per pipeline stage
#[derive(Error, Debug)]
pub enum CanoniError {
    #[error("parse: {0}")]
    Parse(#[from] ParseError),

    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("canonicalize: {0}")]
    Canonicalize(#[from] CanonicalizeError),

    #[error("encode: {0}")]
    Encode(#[from] EncodeError),

    #[error("container runtime: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("configuration: {0}")]
    Config(String),

    #[error("working directory: {0}")]
    WorkDir(#[source] std::io::Error),
}
