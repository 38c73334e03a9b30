//! Default JSON response interpreter.

use serde_json::Value;

use crate::traits::{FaultClass, RawFault, ResponseInterpreter};

/// Remote codes that mean the session is gone.
const EXPIRED_CODES: &[&str] = &["invalid_session_id", "session_expired"];

/// Interpreter that passes JSON results through unchanged.
///
/// Fault codes are normalized to lower snake case (`RECORD_NOT_FOUND`
/// becomes `record_not_found`), and an empty fault message is replaced by a
/// default one so callers always get something to show.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonInterpreter;

impl ResponseInterpreter for JsonInterpreter {
    type Output = Value;

    fn interpret(&self, raw: Value) -> Value {
        raw
    }

    fn classify_fault(&self, fault: &RawFault) -> FaultClass {
        let code = normalize_code(&fault.code);
        let message = if fault.message.trim().is_empty() {
            default_message(&code).to_string()
        } else {
            fault.message.clone()
        };
        FaultClass {
            is_session_expired: EXPIRED_CODES.contains(&code.as_str()),
            code,
            message,
        }
    }
}

/// Lower snake case form of a remote code.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut prev_lower = false;
    for c in code.trim().chars() {
        if c.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        match c {
            '-' | ' ' | '.' => out.push('_'),
            _ => out.push(c.to_ascii_lowercase()),
        }
    }
    if out.is_empty() {
        "remote_fault".to_string()
    } else {
        out
    }
}

/// Fallback message for a normalized code.
#[must_use]
pub fn default_message(code: &str) -> &'static str {
    match code {
        "record_not_found" => "No record matches the given id.",
        "invalid_session_id" | "session_expired" => "The remote session has expired.",
        "pool_timeout" => "No session became available in time.",
        "auth_error" => "The remote endpoint rejected the credentials.",
        "transport_error" => "The remote endpoint could not be reached.",
        "riid_missing" => "The member has no RIID.",
        "list_not_found" => "The list does not exist.",
        "invalid_parameter" => "A request parameter was rejected.",
        _ => "The remote endpoint rejected the request.",
    }
}
