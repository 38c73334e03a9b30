//! Dispatcher for the list-membership API.
//!
//! Provides:
//! - `Client` - Issue remote calls over pooled sessions, renewing an
//!   expired session once, and get back a uniform `Envelope`
//! - `Member` - Member-level helpers (add to list, profile extension
//!   lookups)

pub mod client;
pub mod member;

pub use client::{Client, EnabledOverride, MAX_EXPIRY_RETRIES};
pub use listmember_core::{ClientConfig, Envelope, ErrorBody, RemoteCall, RequestBuilder};
pub use member::Member;
