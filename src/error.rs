use crate::catalog::types::RowDecodeError;
use crate::database::CacheError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpsErrorCode {
    NotFound,
    AmbiguousMatch,
    Timeout,
    NotConnected,
    ConnectionFailed,
    ServerRejected,
    InvalidResult,
    Cache,
    Decode,
    InvalidConfig,
    UnsupportedRuntime,
}

impl OpsErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            OpsErrorCode::NotFound => "not_found",
            OpsErrorCode::AmbiguousMatch => "ambiguous_match",
            OpsErrorCode::Timeout => "timeout",
            OpsErrorCode::NotConnected => "not_connected",
            OpsErrorCode::ConnectionFailed => "connection_failed",
            OpsErrorCode::ServerRejected => "server_rejected",
            OpsErrorCode::InvalidResult => "invalid_result",
            OpsErrorCode::Cache => "cache",
            OpsErrorCode::Decode => "decode",
            OpsErrorCode::InvalidConfig => "invalid_config",
            OpsErrorCode::UnsupportedRuntime => "unsupported_runtime",
        }
    }
}

/// Failure talking to the database, as opposed to the database refusing
/// what it was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transaction timed out after {0:?}")]
    Timeout(Duration),
    #[error("not connected to database")]
    NotConnected,
    #[error("connection failed: {0}")]
    Connection(String),
    /// The blocking API needs a multi-thread runtime to park on.
    #[error("unsupported runtime: {0}")]
    UnsupportedRuntime(String),
}

#[derive(Debug, Error)]
pub enum OpsError {
    #[error("object not found in table '{table}': {model}")]
    NotFound { table: &'static str, model: String },
    #[error("multiple results found in table '{table}' for {model}: {count} matches")]
    AmbiguousMatch {
        table: &'static str,
        model: String,
        count: usize,
    },
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("operation {index} rejected by server: {error} ({details})")]
    ServerRejected {
        index: usize,
        error: String,
        details: String,
    },
    #[error("invalid transaction result: {0}")]
    InvalidResult(String),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Decode(#[from] RowDecodeError),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
}

impl OpsError {
    pub fn code(&self) -> OpsErrorCode {
        match self {
            OpsError::NotFound { .. } => OpsErrorCode::NotFound,
            OpsError::AmbiguousMatch { .. } => OpsErrorCode::AmbiguousMatch,
            OpsError::Transport(err) => match err {
                TransportError::Timeout(_) => OpsErrorCode::Timeout,
                TransportError::NotConnected => OpsErrorCode::NotConnected,
                TransportError::Connection(_) => OpsErrorCode::ConnectionFailed,
                TransportError::UnsupportedRuntime(_) => OpsErrorCode::UnsupportedRuntime,
            },
            OpsError::ServerRejected { .. } => OpsErrorCode::ServerRejected,
            OpsError::InvalidResult(_) => OpsErrorCode::InvalidResult,
            OpsError::Cache(_) => OpsErrorCode::Cache,
            OpsError::Decode(_) => OpsErrorCode::Decode,
            OpsError::InvalidConfig { .. } => OpsErrorCode::InvalidConfig,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OpsError::NotFound { .. })
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, OpsError::AmbiguousMatch { .. })
    }

    /// Transport failures never reached a commit decision and are safe to
    /// retry. Server rejections are deterministic and are not, and neither
    /// is calling from an unsupported runtime.
    pub fn is_retryable(&self) -> bool {
        match self {
            OpsError::Transport(TransportError::UnsupportedRuntime(_)) => false,
            OpsError::Transport(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{OpsError, OpsErrorCode, TransportError};
    use std::time::Duration;

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(OpsErrorCode::NotFound.as_str(), "not_found");
        assert_eq!(OpsErrorCode::AmbiguousMatch.as_str(), "ambiguous_match");
        assert_eq!(OpsErrorCode::ServerRejected.as_str(), "server_rejected");
    }

    #[test]
    fn transport_errors_map_to_their_own_codes() {
        let err = OpsError::from(TransportError::Timeout(Duration::from_millis(5)));
        assert_eq!(err.code(), OpsErrorCode::Timeout);
        assert_eq!(err.code_str(), "timeout");

        let err = OpsError::from(TransportError::Connection("reset".into()));
        assert_eq!(err.code(), OpsErrorCode::ConnectionFailed);
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(OpsError::from(TransportError::NotConnected).is_retryable());
        let rejected = OpsError::ServerRejected {
            index: 2,
            error: "constraint violation".into(),
            details: "bad column".into(),
        };
        assert!(!rejected.is_retryable());
        let ambiguous = OpsError::AmbiguousMatch {
            table: "ACL",
            model: "acl".into(),
            count: 3,
        };
        assert!(!ambiguous.is_retryable());
        assert!(ambiguous.is_ambiguous());
        assert!(!ambiguous.is_not_found());
        let runtime = OpsError::from(TransportError::UnsupportedRuntime("current_thread".into()));
        assert_eq!(runtime.code_str(), "unsupported_runtime");
        assert!(!runtime.is_retryable());
    }
}
