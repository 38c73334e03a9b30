//! Uniform response envelope returned by every call.

use serde::{Deserialize, Serialize};

/// Error codes produced by the client itself.
///
/// Remote fault codes pass through unchanged from the response interpreter.
pub mod codes {
    /// No session became available within the checkout timeout.
    pub const POOL_TIMEOUT: &str = "pool_timeout";
    /// The session expired again on the single retry.
    pub const SESSION_EXPIRED: &str = "session_expired";
    /// Login was rejected.
    pub const AUTH_ERROR: &str = "auth_error";
    /// The endpoint was unreachable or answered with garbage.
    pub const TRANSPORT_ERROR: &str = "transport_error";
}

/// Error payload of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Result of a call.
///
/// Serializes as `{"status": "ok", "result": ...}`,
/// `{"status": "failure", "error": {...}}` or `{"status": "disabled"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Envelope<T> {
    /// The remote call succeeded.
    Ok { result: T },
    /// The call failed; nothing propagates past the client as a panic or `Err`.
    Failure { error: ErrorBody },
    /// The client is switched off; no call was made.
    Disabled,
}

impl<T> Envelope<T> {
    #[must_use]
    pub const fn ok(result: T) -> Self {
        Self::Ok { result }
    }

    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            error: ErrorBody::new(code, message),
        }
    }

    /// Literal status value.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Ok { .. } => "ok",
            Self::Failure { .. } => "failure",
            Self::Disabled => "disabled",
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    #[must_use]
    pub const fn result(&self) -> Option<&T> {
        match self {
            Self::Ok { result } => Some(result),
            _ => None,
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&ErrorBody> {
        match self {
            Self::Failure { error } => Some(error),
            _ => None,
        }
    }

    /// Map the success payload, leaving failures and `Disabled` untouched.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Envelope<U> {
        match self {
            Self::Ok { result } => Envelope::Ok { result: f(result) },
            Self::Failure { error } => Envelope::Failure { error },
            Self::Disabled => Envelope::Disabled,
        }
    }
}
