//! Error taxonomy for backend operations and whole runs

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::backend::Operation;
use crate::scanner::LanguageTag;

/// Errors from a single backend operation
///
/// None of these abort a run on their own: the pipeline degrades to a
/// partial graph (see [`AnalysisError`] for the run-level failures).
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("no backend available for {language}: {reason}")]
    Unavailable {
        language: LanguageTag,
        reason: String,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: Operation,
        timeout: Duration,
    },

    #[error("malformed response to {operation}: {detail}")]
    Protocol { operation: Operation, detail: String },

    #[error("backend for {language} is degraded")]
    Degraded { language: LanguageTag },

    #[error("backend for {language} is closed")]
    Closed { language: LanguageTag },

    #[error("run deadline reached")]
    Cancelled,
}

impl BackendError {
    /// Whether this error counts against the backend's health
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the language can make no further progress in this run
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Degraded { .. } | Self::Closed { .. } | Self::Cancelled | Self::Unavailable { .. }
        )
    }
}

/// Errors that abort a whole analysis run
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("root {path} is not a readable directory: {source}")]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("canonical id collision: {id} is defined in both {first} and {second}")]
    GraphConsistency {
        id: String,
        first: String,
        second: String,
    },

    #[error("analysis cancelled")]
    Cancelled,

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
