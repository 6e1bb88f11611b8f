//! Caller-facing error taxonomy
//!
//! Error kinds are part of the wire contract: never rename a kind's string
//! code, only add new kinds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Category of an execution failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Document or query absent from the registry. The two cases are never
    /// distinguished in responses.
    NotFound,

    /// Parameter set does not match the template's declared params
    BadRequest,

    /// The bound data source could not be resolved
    SourceUnavailable,

    /// The engine rejected the interpolated SQL
    QueryFailed,

    /// Execution exceeded the configured deadline
    Timeout,
}

impl ErrorKind {
    /// Stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::SourceUnavailable => "source_unavailable",
            Self::QueryFailed => "query_failed",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which side of the parameter set comparison failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamErrorKind {
    MissingParams,
    UnexpectedParams,
}

impl ParamErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingParams => "missing_params",
            Self::UnexpectedParams => "unexpected_params",
        }
    }
}

/// Parameter set mismatch
///
/// `names` holds the offending parameter names for internal logging. They
/// are never included in [`ParamError::detail`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {}", .kind.as_str(), .names.iter().cloned().collect::<Vec<_>>().join(", "))]
pub struct ParamError {
    pub kind: ParamErrorKind,
    pub names: BTreeSet<String>,
}

impl ParamError {
    pub fn missing(names: BTreeSet<String>) -> Self {
        Self {
            kind: ParamErrorKind::MissingParams,
            names,
        }
    }

    pub fn unexpected(names: BTreeSet<String>) -> Self {
        Self {
            kind: ParamErrorKind::UnexpectedParams,
            names,
        }
    }

    /// Caller-facing description naming only the mismatch category
    pub fn detail(&self) -> &'static str {
        match self.kind {
            ParamErrorKind::MissingParams => "Missing parameters",
            ParamErrorKind::UnexpectedParams => "Unexpected parameters",
        }
    }
}

/// An execution failure in caller-facing form
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExecError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExecError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Uniform not-found error, identical for missing documents and queries
    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound, "Query not found")
    }

    pub fn bad_request(err: &ParamError) -> Self {
        Self::new(ErrorKind::BadRequest, err.detail())
    }

    pub fn source_unavailable() -> Self {
        Self::new(ErrorKind::SourceUnavailable, "Data source unavailable")
    }

    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueryFailed, message)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "Query timed out")
    }
}

impl From<ParamError> for ExecError {
    fn from(err: ParamError) -> Self {
        Self::bad_request(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_stability() {
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::BadRequest.as_str(), "bad_request");
        assert_eq!(ErrorKind::SourceUnavailable.as_str(), "source_unavailable");
        assert_eq!(ErrorKind::QueryFailed.as_str(), "query_failed");
        assert_eq!(ErrorKind::Timeout.as_str(), "timeout");
    }

    #[test]
    fn param_detail_hides_names() {
        let err = ParamError::unexpected(["secret_filter".to_string()].into_iter().collect());
        let exec: ExecError = err.clone().into();

        assert_eq!(exec.kind, ErrorKind::BadRequest);
        assert!(!exec.message.contains("secret_filter"));
        assert!(err.to_string().contains("secret_filter"));
    }

    #[test]
    fn not_found_is_uniform() {
        assert_eq!(ExecError::not_found(), ExecError::not_found());
    }
}
