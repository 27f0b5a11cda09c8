use std::{fmt, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use serde_json::Error as JsonError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum QuibError {
    #[error("The path {path} was invalid in the data, and therefore could not be assigned: {reason}")]
    DeepAssign { path: String, reason: String },
    #[error("Invalid index: {0}")]
    InvalidIndex(String),
    #[error("No translator found for function '{0}'")]
    NoTranslator(String),
    #[error("Translation requires the shape and type of the result")]
    NeedsShapeAndType,
    #[error("No inverters found for function '{0}'")]
    NoInverter(String),
    #[error("Cannot invert '{0}': its arguments share a common ancestor")]
    CommonAncestor(String),
    #[error("Cannot change quib {quib} at path {path}: no quib in the inversion chain allows overriding")]
    CannotAssign { quib: String, path: String },
    #[error("Assignment cancelled by user")]
    OperationCancelled,
    #[error("Multiple override options exist but no override chooser is registered")]
    NoChooser,
    #[error("Cache does not match result: {0}")]
    CacheMismatch(String),
    #[error("Function evaluation failed: {0}")]
    Evaluation(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Assignment template error: {0}")]
    Template(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
}

impl QuibError {
    /// Errors after which the caller may fall back to a conservative behavior (whole-result
    /// invalidation, local override) instead of failing the whole operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QuibError::NoTranslator(_)
                | QuibError::NeedsShapeAndType
                | QuibError::NoInverter(_)
                | QuibError::CacheMismatch(_)
                | QuibError::DeepAssign { .. }
                | QuibError::InvalidIndex(_)
        )
    }

    pub fn evaluation<E: fmt::Display>(err: E) -> QuibError {
        QuibError::Evaluation(format!("{err}"))
    }
}

impl From<toml::de::Error> for QuibError {
    fn from(src: toml::de::Error) -> QuibError {
        QuibError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for QuibError {
    fn from(src: toml::ser::Error) -> QuibError {
        QuibError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for QuibError {
    fn from(src: JsonError) -> QuibError {
        QuibError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for QuibError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => QuibError::NotFound(format!("{x}")),
            _ => QuibError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for QuibError {
    fn from(x: fmt::Error) -> Self {
        QuibError::Evaluation(format!("{x}"))
    }
}
