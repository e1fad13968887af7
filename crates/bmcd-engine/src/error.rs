//! Error taxonomy for action execution
//!
//! Every failure the engine reports is an [`Error`] value whose [`Code`]
//! is one of the standard RPC status codes, so a transport can put it on
//! the wire without translation.

use bmcd_drivers::BmcError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard RPC status codes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    #[default]
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// Numeric value on the wire
    pub fn as_i32(self) -> i32 {
        match self {
            Code::Ok => 0,
            Code::Cancelled => 1,
            Code::Unknown => 2,
            Code::InvalidArgument => 3,
            Code::DeadlineExceeded => 4,
            Code::NotFound => 5,
            Code::AlreadyExists => 6,
            Code::PermissionDenied => 7,
            Code::ResourceExhausted => 8,
            Code::FailedPrecondition => 9,
            Code::Aborted => 10,
            Code::OutOfRange => 11,
            Code::Unimplemented => 12,
            Code::Internal => 13,
            Code::Unavailable => 14,
            Code::DataLoss => 15,
            Code::Unauthenticated => 16,
        }
    }

    /// Canonical upper-case name, e.g. `DEADLINE_EXCEEDED`
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    /// Whether this code means the request context ended
    pub fn is_context_end(self) -> bool {
        matches!(self, Code::Cancelled | Code::DeadlineExceeded)
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by the engine
///
/// Compared structurally; `Error::default()` is the "no error" value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct Error {
    pub code: Code,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl Error {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn cancelled() -> Self {
        Self::new(Code::Cancelled, "request cancelled")
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(Code::DeadlineExceeded, "request deadline exceeded")
    }

    /// Attach ordered diagnostic details
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// True for the zero value
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

impl From<BmcError> for Error {
    fn from(err: BmcError) -> Self {
        let code = match &err {
            err if err.is_connection() => Code::Unavailable,
            BmcError::AuthenticationFailed(_) => Code::Unauthenticated,
            BmcError::Unsupported(_) | BmcError::InvalidConfig(_) => Code::InvalidArgument,
            BmcError::UserNotFound(_) => Code::NotFound,
            _ => Code::Internal,
        };
        Error::new(code, err.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_values() {
        assert_eq!(Code::Ok.as_i32(), 0);
        assert_eq!(Code::Cancelled.as_i32(), 1);
        assert_eq!(Code::InvalidArgument.as_i32(), 3);
        assert_eq!(Code::DeadlineExceeded.as_i32(), 4);
        assert_eq!(Code::Internal.as_i32(), 13);
        assert_eq!(Code::Unavailable.as_i32(), 14);
        assert_eq!(Code::Unauthenticated.as_i32(), 16);
    }

    #[test]
    fn test_context_end_codes() {
        assert!(Code::Cancelled.is_context_end());
        assert!(Code::DeadlineExceeded.is_context_end());
        assert!(!Code::Unavailable.is_context_end());
        assert!(!Code::Internal.is_context_end());
    }

    #[test]
    fn test_error_display() {
        let err = Error::unauthenticated("no auth found");
        assert_eq!(err.to_string(), "UNAUTHENTICATED: no auth found");
    }

    #[test]
    fn test_default_is_ok() {
        let err = Error::default();
        assert!(err.is_ok());
        assert_eq!(err.code, Code::Ok);
        assert!(err.message.is_empty());
        assert!(err.details.is_empty());
    }

    #[test]
    fn test_structural_equality() {
        let a = Error::internal("all drivers failed").with_details(vec!["a".into(), "b".into()]);
        let b = Error::internal("all drivers failed").with_details(vec!["a".into(), "b".into()]);
        let c = Error::internal("all drivers failed").with_details(vec!["b".into(), "a".into()]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_from_bmc_error() {
        let err: Error = BmcError::ConnectionFailed("refused".into()).into();
        assert_eq!(err.code, Code::Unavailable);
        assert_eq!(err.message, "connection failed: refused");

        let err: Error = BmcError::Timeout("power status".into()).into();
        assert_eq!(err.code, Code::Unavailable);

        let err: Error = BmcError::UnexpectedResponse("no Members".into()).into();
        assert_eq!(err.code, Code::Internal);

        let err: Error = BmcError::AuthenticationFailed("denied".into()).into();
        assert_eq!(err.code, Code::Unauthenticated);

        let err: Error = BmcError::CommandFailed("boom".into()).into();
        assert_eq!(err.code, Code::Internal);

        let err: Error = BmcError::UserNotFound("ops".into()).into();
        assert_eq!(err.code, Code::NotFound);
    }

    #[test]
    fn test_error_serialization() {
        let err = Error::unavailable("all drivers failed").with_details(vec!["ipmitool: x".into()]);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "UNAVAILABLE");
        assert_eq!(json["details"][0], "ipmitool: x");

        let no_details = serde_json::to_value(Error::cancelled()).unwrap();
        assert!(no_details.get("details").is_none());
    }
}
