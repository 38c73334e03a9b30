//! Seams between the dispatcher, the transport, and the interpreter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{config::Credentials, operation::RemoteCall};

/// Opaque login token issued by the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Business-level rejection reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFault {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl RawFault {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            detail: None,
        }
    }
}

/// Login failure.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("login rejected: {0}")]
    Rejected(String),
    #[error("login failed: {0}")]
    Transport(#[from] TransportError),
}

/// Connectivity or decoding failure below the remote protocol.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Whether the session used for the request may no longer be logged in.
    ///
    /// A malformed answer still proves the endpoint saw the session; a
    /// dropped connection or timeout leaves that unknown.
    #[must_use]
    pub const fn session_may_be_lost(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

/// Result of one remote invocation.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Value),
    Fault(RawFault),
    Transport(TransportError),
}

/// Session-based remote procedure transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a session.
    async fn login(&self, credentials: &Credentials) -> Result<SessionHandle, AuthError>;

    /// Invoke one operation through an open session.
    async fn invoke(&self, handle: &SessionHandle, call: &RemoteCall) -> Outcome;

    /// Close a session.
    async fn logout(&self, handle: &SessionHandle) -> Result<(), TransportError>;
}

/// Classification of a remote fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultClass {
    pub code: String,
    pub message: String,
    /// Drives the dispatcher's renew-and-retry branch.
    pub is_session_expired: bool,
}

/// Turns raw remote answers into domain values.
///
/// The interpreter owns the fault-code taxonomy; the dispatcher only looks
/// at `is_session_expired`.
pub trait ResponseInterpreter: Send + Sync + 'static {
    /// Domain value produced from a successful call.
    type Output: Send;

    fn interpret(&self, raw: Value) -> Self::Output;

    fn classify_fault(&self, fault: &RawFault) -> FaultClass;
}
