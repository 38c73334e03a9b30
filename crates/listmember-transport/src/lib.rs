//! Transports for the list-membership API.
//!
//! Provides:
//! - Wire protocol (JSON request/response bodies)
//! - HTTP transport (feature: http)
//! - In-memory scripted endpoint (feature: memory)

pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "http")]
pub use http::HttpTransport;
#[cfg(feature = "memory")]
pub use memory::MemoryTransport;
pub use protocol::{InvokeRequest, LoginRequest, LoginResponse, LogoutRequest, RpcResponse};
