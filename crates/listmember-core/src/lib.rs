//! Core types for the list-membership API client.
//!
//! This crate provides the building blocks shared by the pool, the
//! transports, and the dispatcher:
//! - `ClientConfig` - Endpoint, credentials, pool sizing, enabled switch
//! - `Envelope` - Uniform `ok` / `failure` / `disabled` call result
//! - `Operation` / `RequestBuilder` - Typed remote calls
//! - `Transport` and `ResponseInterpreter` traits

pub mod config;
pub mod envelope;
pub mod interpreter;
pub mod object;
pub mod operation;
pub mod traits;

pub use config::{ClientConfig, ConfigError, Credentials};
pub use envelope::{Envelope, ErrorBody, codes};
pub use interpreter::JsonInterpreter;
pub use object::{InteractObject, ListMergeRule, QueryColumn, RecordData};
pub use operation::{BuildError, Operation, RemoteArg, RemoteCall, RequestBuilder};
pub use traits::{
    AuthError, FaultClass, Outcome, RawFault, ResponseInterpreter, SessionHandle, Transport,
    TransportError,
};
pub use url::Url;
