//! A single authenticated remote session.

use std::time::Duration;

use listmember_core::SessionHandle;
use tokio::time::Instant;

/// An open session and its validity window.
///
/// Owned by the pool; lent out through [`crate::PooledSession`].
#[derive(Debug)]
pub struct Session {
    id: u64,
    handle: SessionHandle,
    created_at: Instant,
    last_validated_at: Instant,
}

impl Session {
    pub(crate) fn new(id: u64, handle: SessionHandle) -> Self {
        let now = Instant::now();
        Self {
            id,
            handle,
            created_at: now,
            last_validated_at: now,
        }
    }

    /// Pool-local identifier, stable for the life of the session.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Last time a call through this session succeeded.
    #[must_use]
    pub const fn last_validated_at(&self) -> Instant {
        self.last_validated_at
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// A session is valid while its age stays below `ttl`.
    #[must_use]
    pub fn is_valid(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }

    pub(crate) fn mark_validated(&mut self) {
        self.last_validated_at = Instant::now();
    }
}
