//! HTTP transport speaking the JSON wire protocol.

use std::time::Duration;

use async_trait::async_trait;
use listmember_core::{
    AuthError, ClientConfig, Credentials, Outcome, RemoteCall, SessionHandle, Transport,
    TransportError,
};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::protocol::{InvokeRequest, LoginRequest, LoginResponse, LogoutRequest, RpcResponse};

/// Transport posting JSON to `{endpoint}/login`, `/invoke` and `/logout`.
pub struct HttpTransport {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for the configured endpoint.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::with_timeout(config.endpoint.clone(), config.request_timeout)
    }

    /// Create a transport with an explicit request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(endpoint: Url, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("listmember-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(classify)?;
        Ok(Self { endpoint, client })
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        let mut base = self.endpoint.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
            .map_err(|e| TransportError::Unreachable(format!("bad endpoint: {e}")))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path)?;
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::Malformed(format!("{path}: HTTP {status}: {e}"))
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Malformed(err.to_string())
    } else {
        TransportError::Unreachable(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn login(&self, credentials: &Credentials) -> Result<SessionHandle, AuthError> {
        let response: LoginResponse = self
            .post("login", &LoginRequest::from(credentials))
            .await?;
        match response {
            LoginResponse::Session { session_id } => Ok(session_id),
            LoginResponse::Fault { fault } => Err(AuthError::Rejected(if fault.message.is_empty() {
                fault.code
            } else {
                fault.message
            })),
        }
    }

    async fn invoke(&self, handle: &SessionHandle, call: &RemoteCall) -> Outcome {
        let request = InvokeRequest {
            session_id: handle.clone(),
            method: call.operation.as_str().to_string(),
            params: call.args.clone(),
        };
        match self.post::<_, RpcResponse>("invoke", &request).await {
            Ok(response) => response.into_outcome(),
            Err(e) => Outcome::Transport(e),
        }
    }

    async fn logout(&self, handle: &SessionHandle) -> Result<(), TransportError> {
        let _: serde_json::Value = self
            .post(
                "logout",
                &LogoutRequest {
                    session_id: handle.clone(),
                },
            )
            .await?;
        Ok(())
    }
}
