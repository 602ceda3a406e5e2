//! Chat-completion collaborator for the batch assistant.
//!
//! Single-shot, synchronous call against an OpenAI-style
//! `/chat/completions` endpoint. Model, endpoint, key and timeout are
//! configuration; a failed call surfaces as one error, never retried.

use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const SYSTEM_PROMPT: &str = "You are a professional L&D Assistant.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat collaborator is not configured: set LDTRACK_CHAT_API_KEY")]
    Unconfigured,
    #[error("chat request failed: {message}")]
    RequestFailed { message: String },
    #[error("chat response unreadable: {message}")]
    ParseError { message: String },
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl ChatConfig {
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("LDTRACK_CHAT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self {
            base_url: std::env::var("LDTRACK_CHAT_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key: std::env::var("LDTRACK_CHAT_API_KEY").ok(),
            model: std::env::var("LDTRACK_CHAT_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            timeout_secs,
        }
    }
}

/// Send one system+user exchange, return the completion text verbatim.
pub fn complete(config: &ChatConfig, system: &str, user: &str) -> Result<String, ChatError> {
    let Some(api_key) = config.api_key.as_deref() else {
        return Err(ChatError::Unconfigured);
    };

    let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
    let agent = ureq::AgentBuilder::new()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build();

    let body = serde_json::json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ],
    });
    let body_str = serde_json::to_string(&body).map_err(|e| ChatError::RequestFailed {
        message: format!("JSON serialize error: {e}"),
    })?;

    let resp = agent
        .post(&url)
        .set("Authorization", &format!("Bearer {}", api_key))
        .set("Content-Type", "application/json")
        .send_string(&body_str)
        .map_err(|e: ureq::Error| ChatError::RequestFailed {
            message: e.to_string(),
        })?;

    let resp_str = resp.into_string().map_err(|e| ChatError::ParseError {
        message: e.to_string(),
    })?;
    let json: serde_json::Value =
        serde_json::from_str(&resp_str).map_err(|e| ChatError::ParseError {
            message: e.to_string(),
        })?;

    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ChatError::ParseError {
            message: "missing completion content".into(),
        })
}
