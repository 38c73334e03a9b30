//! Bounded pool of authenticated sessions.
//!
//! Capacity is enforced by a semaphore: every checked-out session holds one
//! permit, and only a caller holding a permit logs in, either because no
//! idle session is left or because it asked for a fresh one. A login runs on
//! its own task, which logs the session back out if the checkout is dropped
//! before it completes. Two callers can therefore never both log in for the same slot,
//! and the number of open sessions never exceeds the capacity.
//!
//! Expiry is checked lazily at checkout; there is no background timer.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use listmember_core::{
    AuthError, ClientConfig, Credentials, SessionHandle, Transport, TransportError,
};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tracing::{Instrument, debug, trace, warn};

use crate::session::Session;

/// Pool error.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no session available within {0:?}")]
    Timeout(Duration),
    #[error("login failed: {0}")]
    Auth(#[from] AuthError),
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Logins performed over the pool's lifetime.
    pub logins: u64,
}

struct PoolState {
    idle: VecDeque<Session>,
    in_use: usize,
    /// Bumped by `drain`; sessions from an older generation are logged out
    /// on return instead of going back to the idle set.
    generation: u64,
}

struct Inner<T: Transport> {
    transport: Arc<T>,
    credentials: Credentials,
    capacity: usize,
    session_ttl: Duration,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
    logins: AtomicU64,
}

impl<T: Transport> Inner<T> {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        // The guarded sections never panic mid-update, so a poisoned lock
        // still holds consistent counters.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, session: Session, generation: u64, permit: Option<OwnedSemaphorePermit>) {
        let stale = {
            let mut state = self.state();
            state.in_use = state.in_use.saturating_sub(1);
            if generation == state.generation {
                state.idle.push_back(session);
                None
            } else {
                Some(session)
            }
        };
        drop(permit);

        if let Some(session) = stale {
            self.spawn_logout(session, "drained");
        } else {
            trace!("Returned session to pool");
        }
    }

    fn discard(&self, session: Session, permit: Option<OwnedSemaphorePermit>) {
        {
            let mut state = self.state();
            state.in_use = state.in_use.saturating_sub(1);
        }
        drop(permit);
        self.spawn_logout(session, "invalidated");
    }

    fn spawn_logout(&self, session: Session, reason: &'static str) {
        debug!(session_id = session.id(), reason, "Logging out session");
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                session_id = session.id(),
                "No runtime available, dropping session without logout"
            );
            return;
        };
        let transport = Arc::clone(&self.transport);
        runtime.spawn(async move {
            if let Err(e) = transport.logout(session.handle()).await {
                warn!(session_id = session.id(), "Logout failed: {e}");
            }
        });
    }
}

/// Bounded, lazily filled pool of remote sessions.
///
/// Cheap to clone; clones share the same sessions.
pub struct SessionPool<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for SessionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> SessionPool<T> {
    /// Create an empty pool. No session is opened until the first checkout.
    #[must_use]
    pub fn new(transport: Arc<T>, config: &ClientConfig) -> Self {
        let capacity = config.pool_size.get();
        debug!(
            capacity,
            session_ttl_secs = config.session_ttl.as_secs(),
            "Session pool initialized"
        );
        Self {
            inner: Arc::new(Inner {
                transport,
                credentials: config.credentials.clone(),
                capacity,
                session_ttl: config.session_ttl,
                permits: Arc::new(Semaphore::new(capacity)),
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(capacity.min(32)),
                    in_use: 0,
                    generation: 0,
                }),
                next_id: AtomicU64::new(1),
                logins: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    /// Check a session out, waiting at most `timeout` for a free slot.
    ///
    /// Reuses the most recently returned valid session; otherwise logs in a
    /// new one. Idle sessions past their TTL are logged out and dropped
    /// first. Dropping the returned future before it resolves leaves no
    /// reservation behind.
    ///
    /// # Errors
    /// Returns `PoolError::Timeout` if no slot frees up in time and
    /// `PoolError::Auth` if a needed login fails.
    pub async fn checkout(&self, timeout: Duration) -> Result<PooledSession<T>, PoolError> {
        let permit = self.acquire(timeout).await?;

        let (reused, stale) = {
            let mut state = self.inner.state();
            let ttl = self.inner.session_ttl;
            let (fresh, stale): (VecDeque<Session>, VecDeque<Session>) =
                std::mem::take(&mut state.idle)
                    .into_iter()
                    .partition(|s| s.is_valid(ttl));
            state.idle = fresh;
            let generation = state.generation;
            let reused = state.idle.pop_back();
            if reused.is_some() {
                state.in_use += 1;
            }
            (reused.map(|s| (s, generation)), stale)
        };

        for session in stale {
            self.inner.spawn_logout(session, "expired");
        }

        if let Some((session, generation)) = reused {
            trace!(session_id = session.id(), "Reusing idle session");
            return Ok(PooledSession::new(session, generation, permit, &self.inner));
        }

        self.open(permit).await
    }

    /// Check out a newly logged-in session, bypassing the idle set.
    ///
    /// Used after the endpoint rejected a session: idle sessions of the same
    /// age are likely dead too. If the idle set would push the pool past its
    /// capacity, the oldest idle sessions are logged out to make room.
    ///
    /// # Errors
    /// Same as [`Self::checkout`].
    pub async fn checkout_fresh(&self, timeout: Duration) -> Result<PooledSession<T>, PoolError> {
        let permit = self.acquire(timeout).await?;

        let evicted: Vec<Session> = {
            let mut state = self.inner.state();
            let free = self.inner.permits.available_permits();
            let surplus = state.idle.len().saturating_sub(free);
            state.idle.drain(..surplus).collect()
        };
        for session in evicted {
            self.inner.spawn_logout(session, "evicted");
        }

        self.open(permit).await
    }

    async fn acquire(&self, timeout: Duration) -> Result<OwnedSemaphorePermit, PoolError> {
        let acquire = Arc::clone(&self.inner.permits).acquire_owned();
        if let Ok(Ok(permit)) = tokio::time::timeout(timeout, acquire).await {
            return Ok(permit);
        }
        debug!(timeout_ms = timeout.as_millis(), "Session checkout timed out");
        Err(PoolError::Timeout(timeout))
    }

    async fn open(&self, permit: OwnedSemaphorePermit) -> Result<PooledSession<T>, PoolError> {
        let (handle, permit) = self.login(permit).await?;
        let session = Session::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed), handle);
        let generation = {
            let mut state = self.inner.state();
            state.in_use += 1;
            state.generation
        };
        debug!(session_id = session.id(), "Opened new session");
        Ok(PooledSession::new(session, generation, permit, &self.inner))
    }

    /// Log in on a separate task holding `permit`.
    ///
    /// If the checkout is dropped mid-login, the task logs the new session
    /// out before releasing the permit, so no server session is orphaned.
    async fn login(
        &self,
        permit: OwnedSemaphorePermit,
    ) -> Result<(SessionHandle, OwnedSemaphorePermit), PoolError> {
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(
            async move {
                let result = inner.transport.login(&inner.credentials).await;
                if result.is_ok() {
                    inner.logins.fetch_add(1, Ordering::Relaxed);
                }
                if let Err(Ok((handle, permit))) = tx.send(result.map(|handle| (handle, permit))) {
                    debug!("Checkout abandoned during login, logging out");
                    if let Err(e) = inner.transport.logout(&handle).await {
                        warn!("Logout failed: {e}");
                    }
                    drop(permit);
                }
            }
            .in_current_span(),
        );

        match rx.await {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) => {
                warn!(username = %self.inner.credentials.username, "Login failed: {e}");
                Err(PoolError::Auth(e))
            }
            Err(_) => Err(PoolError::Auth(AuthError::Transport(
                TransportError::Unreachable("login task aborted".to_string()),
            ))),
        }
    }

    /// Return a session to the idle set. Never blocks.
    pub fn checkin(&self, session: PooledSession<T>) {
        self.assert_owned(&session);
        session.checkin();
    }

    /// Retire a session: it leaves capacity accounting immediately and is
    /// logged out in the background. Never blocks.
    pub fn invalidate(&self, session: PooledSession<T>) {
        self.assert_owned(&session);
        session.invalidate();
    }

    /// Log out every idle session and reset the pool.
    ///
    /// Sessions checked out at the time are logged out when they come back.
    /// Calling this on an empty pool does nothing.
    pub async fn drain(&self) {
        let sessions = {
            let mut state = self.inner.state();
            state.generation += 1;
            std::mem::take(&mut state.idle)
        };
        if sessions.is_empty() {
            return;
        }

        debug!(count = sessions.len(), "Draining session pool");
        for session in sessions {
            if let Err(e) = self.inner.transport.logout(session.handle()).await {
                warn!(session_id = session.id(), "Logout failed during drain: {e}");
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state();
        PoolStats {
            capacity: self.inner.capacity,
            idle: state.idle.len(),
            in_use: state.in_use,
            logins: self.inner.logins.load(Ordering::Relaxed),
        }
    }

    fn assert_owned(&self, session: &PooledSession<T>) {
        debug_assert!(
            Arc::ptr_eq(&self.inner, &session.pool),
            "session returned to a pool that did not lend it"
        );
    }
}

/// A session lent out by the pool.
///
/// Hand it back with [`SessionPool::checkin`] or [`SessionPool::invalidate`].
/// If it is simply dropped, it is checked in.
pub struct PooledSession<T: Transport> {
    session: Option<Session>,
    generation: u64,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<Inner<T>>,
}

impl<T: Transport> PooledSession<T> {
    fn new(
        session: Session,
        generation: u64,
        permit: OwnedSemaphorePermit,
        pool: &Arc<Inner<T>>,
    ) -> Self {
        Self {
            session: Some(session),
            generation,
            permit: Some(permit),
            pool: Arc::clone(pool),
        }
    }

    /// The underlying session.
    ///
    /// # Panics
    /// Never in practice: the session is only taken when `self` is consumed.
    #[must_use]
    pub fn session(&self) -> &Session {
        self.session
            .as_ref()
            .unwrap_or_else(|| unreachable!("session taken before drop"))
    }

    #[must_use]
    pub fn handle(&self) -> &SessionHandle {
        self.session().handle()
    }

    /// Record a successful call through this session.
    pub fn mark_validated(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.mark_validated();
        }
    }

    fn checkin(mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session, self.generation, self.permit.take());
        }
    }

    fn invalidate(mut self) {
        if let Some(session) = self.session.take() {
            debug!(session_id = session.id(), "Invalidating session");
            self.pool.discard(session, self.permit.take());
        }
    }
}

impl<T: Transport> Drop for PooledSession<T> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session, self.generation, self.permit.take());
        }
    }
}

impl<T: Transport> std::fmt::Debug for PooledSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("session", &self.session)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
