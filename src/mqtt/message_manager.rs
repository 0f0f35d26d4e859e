use chrono::{DateTime, Local};
use std::fmt;

const PREVIEW_CHARS: usize = 32;

/// A decoded text payload received on the subscribed topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    topic: String,
    content: String,
    timestamp: DateTime<Local>,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(PREVIEW_CHARS).collect();
        write!(f, "{} - {}: {}", self.timestamp.format("%H:%M:%S"), self.topic, preview)
    }
}

impl StatusMessage {
    /// Decodes a raw payload as UTF-8. Returns `None` for non-text payloads.
    pub fn decode(topic: &str, payload: &[u8]) -> Option<Self> {
        let content = std::str::from_utf8(payload).ok()?;
        Some(StatusMessage {
            topic: topic.to_string(),
            content: content.to_string(),
            timestamp: Local::now(),
        })
    }

    pub fn into_content(self) -> String {
        self.content
    }

    /// Local time the payload was decoded.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }
}
