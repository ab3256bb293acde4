//! Error taxonomy shared by every handler, provider and reply.
//!
//! Handlers report precondition failures synchronously through
//! `Result<_, ErrorCode>` and runtime failures through the same sink that
//! carries successful fixes. Success is `Ok(..)` and is encoded as
//! [`ErrorCode::NONE`] on the IPC boundary.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Closed set of failure codes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorCode {
    /// The operation exists but this provider does not implement it.
    #[error("Operation not implemented")]
    NotImplemented,

    /// The platform or remote peer did not answer in time.
    #[error("Request timed out")]
    Timeout,

    /// A network round-trip failed.
    #[error("Network error")]
    NetworkError,

    /// The operation has no meaning for this kind of handler.
    #[error("Operation not applicable to this handler")]
    NotApplicableToThisHandler,

    /// The position source (plugin, sub-handler, provider) is absent.
    #[error("Position source not available")]
    NotAvailable,

    /// A request parameter was missing or malformed.
    #[error("Wrong parameter")]
    WrongParameter,

    /// The same kind of request is already in flight.
    #[error("Duplicate request")]
    DuplicateRequest,

    /// The handler cannot stop while requests are in flight.
    #[error("Request in progress")]
    RequestInProgress,

    /// The handler has not been started.
    #[error("Handler not started")]
    NotStarted,

    /// The web-service license key is missing or rejected.
    #[error("License key invalid")]
    LicenseKeyInvalid,

    /// The transport that should carry the request is inactive.
    #[error("Transport inactive")]
    Multithread,
}

impl ErrorCode {
    /// Code sent on the wire for a successful operation.
    pub const NONE: i32 = 0;

    /// Every variant in numeric order.
    pub const ALL: [ErrorCode; 11] = [
        ErrorCode::NotImplemented,
        ErrorCode::Timeout,
        ErrorCode::NetworkError,
        ErrorCode::NotApplicableToThisHandler,
        ErrorCode::NotAvailable,
        ErrorCode::WrongParameter,
        ErrorCode::DuplicateRequest,
        ErrorCode::RequestInProgress,
        ErrorCode::NotStarted,
        ErrorCode::LicenseKeyInvalid,
        ErrorCode::Multithread,
    ];

    /// Stable numeric code used in replies.
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::NotImplemented => 1,
            ErrorCode::Timeout => 2,
            ErrorCode::NetworkError => 3,
            ErrorCode::NotApplicableToThisHandler => 4,
            ErrorCode::NotAvailable => 5,
            ErrorCode::WrongParameter => 6,
            ErrorCode::DuplicateRequest => 7,
            ErrorCode::RequestInProgress => 8,
            ErrorCode::NotStarted => 9,
            ErrorCode::LicenseKeyInvalid => 10,
            ErrorCode::Multithread => 11,
        }
    }

    /// Inverse of [`code`](Self::code). `NONE` and unknown values yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }

    /// Constant-style name, e.g. `DUPLICATE_REQUEST`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::NotApplicableToThisHandler => "NOT_APPLICABLE_TO_THIS_HANDLER",
            ErrorCode::NotAvailable => "NOT_AVAILABLE",
            ErrorCode::WrongParameter => "WRONG_PARAMETER",
            ErrorCode::DuplicateRequest => "DUPLICATE_REQUEST",
            ErrorCode::RequestInProgress => "REQUEST_IN_PROGRESS",
            ErrorCode::NotStarted => "NOT_STARTED",
            ErrorCode::LicenseKeyInvalid => "LICENSE_KEY_INVALID",
            ErrorCode::Multithread => "MULTITHREAD",
        }
    }

    /// Human-readable text used for `errorText` in replies.
    pub fn text(self) -> String {
        self.to_string()
    }
}

/// Error returned when parsing an unknown error-code name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownErrorCode(pub String);

impl fmt::Display for UnknownErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown error code '{}'", self.0)
    }
}

impl std::error::Error for UnknownErrorCode {}

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownErrorCode(s.to_string()))
    }
}

/// Encode a handler result as the numeric code carried in replies.
pub fn result_code<T>(result: &Result<T, ErrorCode>) -> i32 {
    match result {
        Ok(_) => ErrorCode::NONE,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::NotImplemented.code(), 1);
        assert_eq!(ErrorCode::NotApplicableToThisHandler.code(), 4);
        assert_eq!(ErrorCode::DuplicateRequest.code(), 7);
        assert_eq!(ErrorCode::LicenseKeyInvalid.code(), 10);
        assert_eq!(ErrorCode::Multithread.code(), 11);
    }

    #[test]
    fn test_codes_are_unique_and_nonzero() {
        let codes: HashSet<i32> = ErrorCode::ALL.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), ErrorCode::ALL.len());
        assert!(!codes.contains(&ErrorCode::NONE));
    }

    #[test]
    fn test_from_code() {
        assert_eq!(ErrorCode::from_code(5), Some(ErrorCode::NotAvailable));
        assert_eq!(ErrorCode::from_code(ErrorCode::NONE), None);
        assert_eq!(ErrorCode::from_code(99), None);
    }

    #[test]
    fn test_parse_name() {
        assert_eq!(
            "request_in_progress".parse::<ErrorCode>(),
            Ok(ErrorCode::RequestInProgress)
        );
        assert!("BOGUS".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_result_code() {
        assert_eq!(result_code(&Ok::<(), ErrorCode>(())), 0);
        assert_eq!(result_code::<()>(&Err(ErrorCode::Timeout)), 2);
    }

    #[test]
    fn test_text_matches_display() {
        assert_eq!(ErrorCode::NotStarted.text(), "Handler not started");
    }
}
