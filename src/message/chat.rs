use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A chat message as published by the producing API. Unknown extra fields
/// are ignored; anything that is not a JSON object of this shape fails to
/// decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "unknown_author")]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub sent_at: Option<String>,
}

fn unknown_author() -> String {
    "Unknown".to_string()
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatMessage {
    /// Decode a raw delivery payload: UTF-8 text first, then JSON.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Human-readable send time. An absent or empty `sent_at` renders as
    /// "Unknown Time"; a value that does not parse is shown unchanged.
    pub fn formatted_sent_at(&self) -> String {
        match self.sent_at.as_deref() {
            Some(raw) if !raw.is_empty() => format_timestamp(raw),
            _ => "Unknown Time".to_string(),
        }
    }
}

/// Format an ISO-8601 timestamp (trailing "Z" accepted) for display,
/// falling back to the raw string when it does not parse.
pub fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.format("%Y-%m-%d %H:%M:%S").to_string(),
        Err(_) => raw.to_string(),
    }
}
