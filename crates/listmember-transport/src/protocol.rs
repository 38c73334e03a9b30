//! JSON wire protocol for the remote endpoint.

use listmember_core::{Credentials, Outcome, RawFault, RemoteArg, SessionHandle};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Login request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl From<&Credentials> for LoginRequest {
    fn from(credentials: &Credentials) -> Self {
        Self {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        }
    }
}

/// Login response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoginResponse {
    /// Login accepted.
    Session {
        #[serde(rename = "sessionId")]
        session_id: SessionHandle,
    },
    /// Login refused.
    Fault { fault: RawFault },
}

/// Invoke request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub session_id: SessionHandle,
    pub method: String,
    pub params: Vec<RemoteArg>,
}

/// Logout request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub session_id: SessionHandle,
}

/// Invoke response body: either a result or a fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Result { result: Value },
    Fault { fault: RawFault },
}

impl RpcResponse {
    /// Convert into a transport outcome.
    #[must_use]
    pub fn into_outcome(self) -> Outcome {
        match self {
            Self::Result { result } => Outcome::Success(result),
            Self::Fault { fault } => Outcome::Fault(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_response_variants() {
        let ok: RpcResponse = serde_json::from_value(json!({"result": [1, 2]})).unwrap();
        assert!(matches!(ok.into_outcome(), Outcome::Success(v) if v == json!([1, 2])));

        let fault: RpcResponse = serde_json::from_value(json!({
            "fault": {"code": "RECORD_NOT_FOUND", "message": "missing"}
        }))
        .unwrap();
        match fault.into_outcome() {
            Outcome::Fault(f) => {
                assert_eq!(f.code, "RECORD_NOT_FOUND");
                assert!(f.detail.is_none());
            }
            other => panic!("Wrong outcome: {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(serde_json::from_value::<RpcResponse>(json!({"unexpected": true})).is_err());
    }

    #[test]
    fn test_login_response() {
        let parsed: LoginResponse =
            serde_json::from_value(json!({"sessionId": "abc"})).unwrap();
        if let LoginResponse::Session { session_id } = parsed {
            assert_eq!(session_id.as_str(), "abc");
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_invoke_request_shape() {
        let req = InvokeRequest {
            session_id: SessionHandle::new("abc"),
            method: "retrieveListMembers".to_string(),
            params: vec![RemoteArg {
                name: "queryColumn".to_string(),
                value: json!("RIID"),
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["params"][0]["name"], "queryColumn");
    }
}
