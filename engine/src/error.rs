//! Error types for the DocSync engine.

use crate::ChangeKind;
use thiserror::Error;

/// All possible errors from the DocSync engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Configuration errors
    #[error("you must specify a valid {0}")]
    MissingSetting(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid document filter: {0}")]
    InvalidFilter(String),

    // Read errors
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("document has no _id field")]
    MissingIdentifier,

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("{source} _id: {id}")]
    Materialize { id: String, source: Box<Error> },

    // Write errors
    #[error("{kind} failed for {target}: {source}")]
    Write {
        kind: ChangeKind,
        target: String,
        source: Box<Error>,
    },

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Wrap an error with the identifier of the document being materialized.
    pub fn materialize(id: impl Into<String>, source: Error) -> Self {
        Error::Materialize {
            id: id.into(),
            source: Box::new(source),
        }
    }

    /// Wrap an error raised while writing one unit of a change set.
    pub fn write(kind: ChangeKind, target: impl Into<String>, source: Error) -> Self {
        Error::Write {
            kind,
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, with write/materialize context stripped.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Materialize { source, .. } | Error::Write { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
