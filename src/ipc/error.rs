use serde_json::json;
use thiserror::Error;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Closed set of failure kinds for handler operations. Validation and scope
/// errors fire before any mutation; upstream/internal wrap collaborator and
/// store failures with the underlying message, no retry, no rollback.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("{0}")]
    BadParams(String),
    #[error("missing managerId/batchId scope")]
    MissingScope,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OpError {
    pub fn code(&self) -> &'static str {
        match self {
            OpError::BadParams(_) => "bad_params",
            OpError::MissingScope => "missing_scope",
            OpError::NotFound(_) => "not_found",
            OpError::Conflict(_) => "conflict",
            OpError::InvalidCredentials => "invalid_credentials",
            OpError::Upstream(_) => "upstream_failed",
            OpError::Internal(_) => "internal_error",
        }
    }

    pub fn response(&self, id: &str) -> serde_json::Value {
        err(id, self.code(), self.to_string(), None)
    }
}

impl From<rusqlite::Error> for OpError {
    fn from(e: rusqlite::Error) -> Self {
        OpError::Internal(e.into())
    }
}

impl From<serde_json::Error> for OpError {
    fn from(e: serde_json::Error) -> Self {
        OpError::Internal(e.into())
    }
}
