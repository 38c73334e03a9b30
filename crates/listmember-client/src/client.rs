//! Call dispatcher.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use listmember_core::{
    ClientConfig, Envelope, JsonInterpreter, Outcome, RemoteCall, ResponseInterpreter, Transport,
    codes,
};
use listmember_pool::{PoolError, PoolStats, SessionPool};
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

/// How many times a call is retried after a session-expiry fault.
pub const MAX_EXPIRY_RETRIES: usize = 1;

/// Entry point for remote calls.
///
/// Owns the configuration, the transport, and a lazily built session pool.
/// Every call returns an [`Envelope`]; nothing escapes as an `Err`.
pub struct Client<T: Transport, I: ResponseInterpreter = JsonInterpreter> {
    config: ClientConfig,
    enabled: Arc<AtomicBool>,
    transport: Arc<T>,
    interpreter: I,
    pool: Mutex<Option<SessionPool<T>>>,
}

impl<T: Transport> Client<T, JsonInterpreter> {
    /// Create a client that hands back raw JSON results.
    #[must_use]
    pub fn new(config: ClientConfig, transport: Arc<T>) -> Self {
        Self::with_interpreter(config, transport, JsonInterpreter)
    }
}

impl<T: Transport, I: ResponseInterpreter> Client<T, I> {
    /// Create a client with a custom response interpreter.
    #[must_use]
    pub fn with_interpreter(config: ClientConfig, transport: Arc<T>, interpreter: I) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(config.enabled)),
            config,
            transport,
            interpreter,
            pool: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn interpreter(&self) -> &I {
        &self.interpreter
    }

    /// Whether calls currently reach the network.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Switch the client on or off.
    pub fn set_enabled(&self, enabled: bool) {
        debug!(enabled, "Client switch changed");
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Switch the client on or off until the returned guard is dropped.
    pub fn override_enabled(&self, enabled: bool) -> EnabledOverride {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        EnabledOverride {
            flag: Arc::clone(&self.enabled),
            previous,
        }
    }

    /// Pool counters, or `None` if no call has built the pool yet.
    #[must_use]
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool_slot().as_ref().map(SessionPool::stats)
    }

    /// Log every session out and drop the pool. The next call starts fresh.
    pub async fn shutdown(&self) {
        let pool = self.pool_slot().take();
        if let Some(pool) = pool {
            debug!("Shutting client down");
            pool.drain().await;
        }
    }

    /// Issue one remote call.
    ///
    /// A session-expiry fault invalidates the session and retries once on a
    /// fresh one; every other failure is returned as is.
    pub async fn call(&self, call: &RemoteCall) -> Envelope<I::Output> {
        if !self.enabled() {
            debug!(operation = %call.operation, "Client disabled, skipping call");
            return Envelope::Disabled;
        }

        let pool = self.pool();
        let span = info_span!("call", call_id = %Uuid::new_v4(), operation = %call.operation);
        self.dispatch(&pool, call).instrument(span).await
    }

    async fn dispatch(&self, pool: &SessionPool<T>, call: &RemoteCall) -> Envelope<I::Output> {
        let mut renewals = 0;
        loop {
            let timeout = self.config.checkout_timeout;
            let checkout = if renewals == 0 {
                pool.checkout(timeout).await
            } else {
                pool.checkout_fresh(timeout).await
            };
            let mut session = match checkout {
                Ok(session) => session,
                Err(e) => return pool_failure(&e),
            };

            match self.transport.invoke(session.handle(), call).await {
                Outcome::Success(raw) => {
                    session.mark_validated();
                    pool.checkin(session);
                    return Envelope::ok(self.interpreter.interpret(raw));
                }
                Outcome::Fault(fault) => {
                    let class = self.interpreter.classify_fault(&fault);
                    if !class.is_session_expired {
                        pool.checkin(session);
                        debug!(code = %class.code, "Remote fault");
                        return Envelope::failure(class.code, class.message);
                    }

                    pool.invalidate(session);
                    if renewals >= MAX_EXPIRY_RETRIES {
                        warn!(code = %class.code, "Session expired again after renewal");
                        return Envelope::failure(codes::SESSION_EXPIRED, class.message);
                    }
                    renewals += 1;
                    warn!(code = %class.code, "Session expired, renewing");
                }
                Outcome::Transport(e) => {
                    if e.session_may_be_lost() {
                        pool.invalidate(session);
                    } else {
                        pool.checkin(session);
                    }
                    error!("Transport error: {e}");
                    return Envelope::failure(codes::TRANSPORT_ERROR, e.to_string());
                }
            }
        }
    }

    fn pool(&self) -> SessionPool<T> {
        self.pool_slot()
            .get_or_insert_with(|| SessionPool::new(Arc::clone(&self.transport), &self.config))
            .clone()
    }

    fn pool_slot(&self) -> MutexGuard<'_, Option<SessionPool<T>>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn pool_failure<O>(err: &PoolError) -> Envelope<O> {
    let code = match err {
        PoolError::Timeout(_) => codes::POOL_TIMEOUT,
        PoolError::Auth(_) => codes::AUTH_ERROR,
    };
    warn!(code, "Session checkout failed: {err}");
    Envelope::failure(code, err.to_string())
}

/// Restores the client's enabled switch when dropped.
#[must_use = "the override is undone as soon as the guard is dropped"]
pub struct EnabledOverride {
    flag: Arc<AtomicBool>,
    previous: bool,
}

impl Drop for EnabledOverride {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use listmember_core::{
        Credentials, FaultClass, Operation, RawFault, TransportError, Url, interpreter,
    };
    use listmember_transport::MemoryTransport;
    use serde_json::{Value, json};

    use super::*;

    fn config(size: usize) -> ClientConfig {
        ClientConfig::new(
            Url::parse("https://api.example.test/rpc").unwrap(),
            Credentials::new("user", "secret"),
        )
        .with_pool_size(size)
        .unwrap()
        .with_checkout_timeout(Duration::from_secs(5))
    }

    fn client(size: usize) -> (Client<MemoryTransport>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        (Client::new(config(size), Arc::clone(&transport)), transport)
    }

    fn retrieve() -> RemoteCall {
        RemoteCall::new(Operation::RetrieveListMembers)
    }

    #[tokio::test]
    async fn test_success_passes_result_through() {
        let (client, transport) = client(2);
        let raw = json!({"recordData": {"fieldNames": ["RIID_"], "records": [["42"]]}});
        transport.set_default_result(raw.clone());

        let envelope = client.call(&retrieve()).await;
        assert_eq!(envelope, Envelope::ok(client.interpreter().interpret(raw)));
        assert_eq!(client.pool_stats().unwrap().idle, 1);
    }

    #[tokio::test]
    async fn test_single_expiry_is_transparent() {
        let (client, transport) = client(1);
        transport.set_default_result(json!("fine"));
        // Warm up so the expiry hits an existing session.
        assert!(client.call(&retrieve()).await.is_ok());
        let logins_before = transport.logins();
        let invocations_before = transport.invocation_count();

        transport.push_expired();
        let envelope = client.call(&retrieve()).await;

        assert_eq!(envelope, Envelope::ok(json!("fine")));
        assert_eq!(transport.logins() - logins_before, 1);
        assert_eq!(transport.invocation_count() - invocations_before, 2);
    }

    #[tokio::test]
    async fn test_second_expiry_is_surfaced() {
        let (client, transport) = client(1);
        transport.push_expired();
        transport.push_expired();

        let envelope = client.call(&retrieve()).await;

        let error = envelope.error().unwrap();
        assert_eq!(envelope.status(), "failure");
        assert_eq!(error.code, codes::SESSION_EXPIRED);
        assert_eq!(transport.invocation_count(), 1 + MAX_EXPIRY_RETRIES);
        assert_eq!(transport.logins(), 2);
        assert_eq!(client.pool_stats().unwrap().in_use, 0);
    }

    #[tokio::test]
    async fn test_remote_fault_not_retried() {
        let (client, transport) = client(1);
        transport.push_fault("RECORD_NOT_FOUND", "No record found for RIID 000001");

        let envelope = client.call(&retrieve()).await;

        let error = envelope.error().unwrap();
        assert_eq!(error.code, "record_not_found");
        assert!(!error.message.is_empty());
        assert_eq!(transport.invocation_count(), 1);
        assert_eq!(transport.logins(), 1);
        // The session survived the fault.
        assert_eq!(client.pool_stats().unwrap().idle, 1);
    }

    #[tokio::test]
    async fn test_disabled_client_touches_nothing() {
        let (client, transport) = client(1);
        client.set_enabled(false);

        for operation in [
            Operation::MergeListMembers,
            Operation::MergeListMembersRiid,
            Operation::RetrieveListMembers,
            Operation::DeleteListMembers,
            Operation::RetrieveProfileExtensionRecords,
            Operation::MergeIntoProfileExtension,
        ] {
            let envelope = client.call(&RemoteCall::new(operation)).await;
            assert!(envelope.is_disabled());
            assert!(envelope.error().is_none());
        }

        assert!(client.pool_stats().is_none());
        assert_eq!(transport.logins(), 0);
        assert_eq!(transport.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_keeps_existing_pool_untouched() {
        let (client, _transport) = client(2);
        assert!(client.call(&retrieve()).await.is_ok());
        let before = client.pool_stats().unwrap();

        let guard = client.override_enabled(false);
        assert!(client.call(&retrieve()).await.is_disabled());
        assert_eq!(client.pool_stats().unwrap(), before);

        drop(guard);
        assert!(client.enabled());
        assert!(client.call(&retrieve()).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_failure_is_auth_error() {
        let (client, transport) = client(1);
        transport.reject_logins("bad password");

        let envelope = client.call(&retrieve()).await;

        assert_eq!(envelope.error().unwrap().code, codes::AUTH_ERROR);
        assert_eq!(transport.invocation_count(), 0);
        let stats = client.pool_stats().unwrap();
        assert_eq!((stats.idle, stats.in_use), (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_timeout() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_latency(Duration::from_secs(10));
        let client = Arc::new(Client::new(
            config(1).with_checkout_timeout(Duration::from_secs(1)),
            Arc::clone(&transport),
        ));

        let slow = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call(&retrieve()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let envelope = client.call(&retrieve()).await;
        assert_eq!(envelope.error().unwrap().code, codes::POOL_TIMEOUT);
        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_serializes_calls() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_latency(Duration::from_millis(100));
        let client = Client::new(config(1), Arc::clone(&transport));

        let (first, second) = (retrieve(), retrieve());
        let started = tokio::time::Instant::now();
        let (a, b) = futures::join!(client.call(&first), client.call(&second));

        assert!(a.is_ok() && b.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(transport.peak_concurrency(), 1);
        assert_eq!(transport.logins(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_never_share_a_session() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_latency(Duration::from_millis(5));
        let client = Arc::new(Client::new(config(3), Arc::clone(&transport)));

        let tasks: Vec<_> = (0..30)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.call(&retrieve()).await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            assert!(task.unwrap().is_ok());
        }

        assert_eq!(transport.overlapping_uses(), 0);
        assert!(transport.peak_concurrency() <= 3);
        assert!(transport.logins() <= 3);
    }

    #[tokio::test]
    async fn test_transport_errors_not_retried() {
        let (client, transport) = client(1);

        transport.push_outcome(Outcome::Transport(TransportError::Malformed("<html>".into())));
        let envelope = client.call(&retrieve()).await;
        assert_eq!(envelope.error().unwrap().code, codes::TRANSPORT_ERROR);
        assert_eq!(client.pool_stats().unwrap().idle, 1);

        transport.push_outcome(Outcome::Transport(TransportError::Timeout));
        let envelope = client.call(&retrieve()).await;
        assert_eq!(envelope.error().unwrap().code, codes::TRANSPORT_ERROR);
        assert_eq!(client.pool_stats().unwrap().idle, 0);

        assert_eq!(transport.invocation_count(), 2);
    }

    #[tokio::test]
    async fn test_server_side_expiry_recovers() {
        let (client, transport) = client(2);
        assert!(client.call(&retrieve()).await.is_ok());

        transport.expire_all_sessions();
        assert!(client.call(&retrieve()).await.is_ok());
        assert_eq!(transport.logins(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_renews_past_warm_dead_sessions() {
        let transport = Arc::new(MemoryTransport::new());
        let client = Client::new(config(2), Arc::clone(&transport));

        transport.set_latency(Duration::from_millis(20));
        let (first, second) = (retrieve(), retrieve());
        let (a, b) = futures::join!(client.call(&first), client.call(&second));
        assert!(a.is_ok() && b.is_ok());
        transport.set_latency(Duration::ZERO);
        assert_eq!(client.pool_stats().unwrap().idle, 2);
        assert_eq!(transport.logins(), 2);

        transport.expire_all_sessions();
        let envelope = client.call(&retrieve()).await;

        assert!(envelope.is_ok(), "unexpected envelope: {envelope:?}");
        assert_eq!(transport.logins(), 3);
        assert_eq!(transport.invocation_count(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rebuilds() {
        let (client, transport) = client(2);
        assert!(client.call(&retrieve()).await.is_ok());

        client.shutdown().await;
        assert!(client.pool_stats().is_none());
        assert_eq!(transport.logouts(), 1);

        client.shutdown().await;
        assert_eq!(transport.logouts(), 1);

        assert!(client.call(&retrieve()).await.is_ok());
        assert_eq!(transport.logins(), 2);
    }

    struct Tagged;

    impl ResponseInterpreter for Tagged {
        type Output = String;

        fn interpret(&self, raw: Value) -> String {
            format!("tagged:{raw}")
        }

        fn classify_fault(&self, fault: &RawFault) -> FaultClass {
            FaultClass {
                code: format!("custom_{}", interpreter::normalize_code(&fault.code)),
                message: fault.message.clone(),
                is_session_expired: fault.code == "GONE",
            }
        }
    }

    #[tokio::test]
    async fn test_custom_interpreter_owns_taxonomy() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_default_result(json!(7));
        let client = Client::with_interpreter(config(1), Arc::clone(&transport), Tagged);

        transport.push_fault("GONE", "bye");
        let envelope = client.call(&retrieve()).await;
        assert_eq!(envelope, Envelope::ok("tagged:7".to_string()));
        assert_eq!(transport.invocation_count(), 2);
        assert_eq!(transport.logins(), 2);

        transport.push_fault("RECORD_NOT_FOUND", "missing");
        let envelope = client.call(&retrieve()).await;
        assert_eq!(envelope.error().unwrap().code, "custom_record_not_found");
        assert_eq!(transport.invocation_count(), 3);
    }
}
