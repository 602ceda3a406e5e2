use serde_json::Value;

use super::error::OpError;

/// Tenancy pair required on every scoped method; absence is rejected before
/// touching the store.
pub fn require_scope(params: &Value) -> Result<(String, String), OpError> {
    let manager_id = params
        .get("managerId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty());
    let batch_id = params
        .get("batchId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty());
    match (manager_id, batch_id) {
        (Some(m), Some(b)) => Ok((m.to_string(), b.to_string())),
        _ => Err(OpError::MissingScope),
    }
}

pub fn require_str(params: &Value, key: &str) -> Result<String, OpError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| OpError::BadParams(format!("missing {}", key)))
}

pub fn require_f64(params: &Value, key: &str) -> Result<f64, OpError> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| OpError::BadParams(format!("missing/invalid {}", key)))
}

pub fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn opt_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}
