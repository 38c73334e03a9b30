//! In-memory transport.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use listmember_core::{
    AuthError, Credentials, Operation, Outcome, RawFault, RemoteCall, SessionHandle, Transport,
    TransportError,
};
use serde_json::Value;
use uuid::Uuid;

/// Fault code the in-memory endpoint answers with for unknown sessions.
pub const INVALID_SESSION_ID: &str = "INVALID_SESSION_ID";

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub handle: SessionHandle,
    pub operation: Operation,
}

#[derive(Default)]
struct State {
    script: VecDeque<Outcome>,
    default_result: Value,
    reject_logins: Option<String>,
    live: HashSet<SessionHandle>,
    in_flight: HashSet<SessionHandle>,
    invocations: Vec<Invocation>,
}

/// Scripted in-process endpoint.
///
/// Useful for development and tests. Sessions are random tokens; invoking
/// with a token that was never issued, or was logged out or expired,
/// answers with an `INVALID_SESSION_ID` fault. Queued outcomes are consumed
/// first-in first-out; once the queue is empty every call succeeds with the
/// default result.
pub struct MemoryTransport {
    state: Mutex<State>,
    latency: Mutex<Duration>,
    login_latency: Mutex<Duration>,
    logins: AtomicUsize,
    logouts: AtomicUsize,
    concurrent: AtomicUsize,
    peak_concurrent: AtomicUsize,
    overlapping_uses: AtomicUsize,
}

impl MemoryTransport {
    /// Create an endpoint that answers every call with `null`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                default_result: Value::Null,
                ..State::default()
            }),
            latency: Mutex::new(Duration::ZERO),
            login_latency: Mutex::new(Duration::ZERO),
            logins: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            concurrent: AtomicUsize::new(0),
            peak_concurrent: AtomicUsize::new(0),
            overlapping_uses: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Result returned once the script runs dry.
    pub fn set_default_result(&self, result: Value) {
        self.state().default_result = result;
    }

    /// Queue an outcome for the next invocation.
    pub fn push_outcome(&self, outcome: Outcome) {
        self.state().script.push_back(outcome);
    }

    /// Queue a remote fault for the next invocation.
    pub fn push_fault(&self, code: &str, message: &str) {
        self.push_outcome(Outcome::Fault(RawFault::new(code, message)));
    }

    /// Queue a session-expiry fault for the next invocation.
    pub fn push_expired(&self) {
        self.push_fault(INVALID_SESSION_ID, "Session has expired");
    }

    /// Make every login fail with `reason` until [`Self::accept_logins`].
    pub fn reject_logins(&self, reason: impl Into<String>) {
        self.state().reject_logins = Some(reason.into());
    }

    pub fn accept_logins(&self) {
        self.state().reject_logins = None;
    }

    /// Delay applied to every invocation.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Delay applied to every login.
    pub fn set_login_latency(&self, latency: Duration) {
        *self.login_latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Forget every issued session, as if the endpoint had expired them.
    pub fn expire_all_sessions(&self) {
        self.state().live.clear();
    }

    #[must_use]
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.state().live.len()
    }

    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state().invocations.clone()
    }

    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.state().invocations.len()
    }

    /// Highest number of invocations seen running at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak_concurrent.load(Ordering::SeqCst)
    }

    /// Times an invocation started on a session that was already busy.
    #[must_use]
    pub fn overlapping_uses(&self) -> usize {
        self.overlapping_uses.load(Ordering::SeqCst)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn login(&self, credentials: &Credentials) -> Result<SessionHandle, AuthError> {
        let latency = *self.login_latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if let Some(reason) = &state.reject_logins {
            return Err(AuthError::Rejected(reason.clone()));
        }
        let handle = SessionHandle::new(format!("{}-{}", credentials.username, Uuid::new_v4()));
        state.live.insert(handle.clone());
        self.logins.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(handle = handle.as_str(), "memory login");
        Ok(handle)
    }

    async fn invoke(&self, handle: &SessionHandle, call: &RemoteCall) -> Outcome {
        {
            let mut state = self.state();
            if !state.in_flight.insert(handle.clone()) {
                self.overlapping_uses.fetch_add(1, Ordering::SeqCst);
            }
            state.invocations.push(Invocation {
                handle: handle.clone(),
                operation: call.operation,
            });
        }
        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_concurrent.fetch_max(now, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        let mut state = self.state();
        state.in_flight.remove(handle);

        if !state.live.contains(handle) {
            return Outcome::Fault(RawFault::new(INVALID_SESSION_ID, "Unknown session"));
        }
        let scripted = state.script.pop_front();
        match scripted {
            Some(Outcome::Fault(fault)) if fault.code == INVALID_SESSION_ID => {
                state.live.remove(handle);
                Outcome::Fault(fault)
            }
            Some(outcome) => outcome,
            None => Outcome::Success(state.default_result.clone()),
        }
    }

    async fn logout(&self, handle: &SessionHandle) -> Result<(), TransportError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        self.state().live.remove(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call() -> RemoteCall {
        RemoteCall::new(Operation::RetrieveListMembers)
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let transport = MemoryTransport::new();
        transport.set_default_result(json!("fine"));
        transport.push_fault("RECORD_NOT_FOUND", "missing");

        let handle = transport
            .login(&Credentials::new("user", "secret"))
            .await
            .unwrap();
        assert!(matches!(transport.invoke(&handle, &call()).await, Outcome::Fault(f) if f.code == "RECORD_NOT_FOUND"));
        assert!(matches!(transport.invoke(&handle, &call()).await, Outcome::Success(v) if v == json!("fine")));
        assert_eq!(transport.invocation_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_session_faults() {
        let transport = MemoryTransport::new();
        let outcome = transport.invoke(&SessionHandle::new("forged"), &call()).await;
        assert!(matches!(outcome, Outcome::Fault(f) if f.code == INVALID_SESSION_ID));
    }

    #[tokio::test]
    async fn test_scripted_expiry_kills_session() {
        let transport = MemoryTransport::new();
        let handle = transport
            .login(&Credentials::new("user", "secret"))
            .await
            .unwrap();
        transport.push_expired();

        assert!(matches!(transport.invoke(&handle, &call()).await, Outcome::Fault(_)));
        assert_eq!(transport.live_sessions(), 0);
        assert!(matches!(transport.invoke(&handle, &call()).await, Outcome::Fault(_)));
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let transport = MemoryTransport::new();
        transport.reject_logins("bad password");
        let err = tokio_test::assert_err!(transport.login(&Credentials::new("user", "wrong")).await);
        assert!(matches!(err, AuthError::Rejected(reason) if reason == "bad password"));
        assert_eq!(transport.logins(), 0);
    }
}
