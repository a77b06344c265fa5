//! Errors from layered configuration resolution and validation.

use common::ErrorKind;

/// One validation finding. `code` matches the stable error taxonomy so
/// `config validate` output can be scripted against.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub severity: Severity,
    pub message: String,
    pub code: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as {format}: {message}")]
    Parse {
        path: String,
        format: &'static str,
        message: String,
    },

    /// Carries every offending field, not just the first (spec requirement).
    #[error("configuration invalid: {} issue(s)", issues.len())]
    Invalid { issues: Vec<ValidationIssue> },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } => ErrorKind::ConfigInvalid,
            Error::Parse { .. } => ErrorKind::ConfigInvalid,
            Error::Invalid { .. } => ErrorKind::ConfigInvalid,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
