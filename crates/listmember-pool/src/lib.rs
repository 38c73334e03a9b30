//! Bounded pool of authenticated sessions against the remote endpoint.
//!
//! Provides:
//! - `Session` - One login token and its validity window
//! - `SessionPool` - Concurrency-safe checkout/checkin with lazy login
//!   and lazy expiry

pub mod pool;
pub mod session;

pub use pool::{PoolError, PoolStats, PooledSession, SessionPool};
pub use session::Session;
