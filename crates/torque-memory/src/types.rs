use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use torque_core::types::{Message, Role};

use crate::error::Result;

/// Compact wire form of one history message.
///
/// Field names are single letters on purpose: the whole window is
/// re-serialized on every append, and the value format must stay stable
/// across writers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessage {
    /// "u" (user) or "a" (assistant).
    pub r: String,
    pub c: String,
    /// Unix timestamp, seconds.
    pub t: i64,
}

impl From<&Message> for StoredMessage {
    fn from(m: &Message) -> Self {
        Self {
            r: match m.role {
                Role::User => "u".to_string(),
                Role::Assistant => "a".to_string(),
            },
            c: m.content.clone(),
            t: m.timestamp.timestamp(),
        }
    }
}

impl From<&StoredMessage> for Message {
    fn from(s: &StoredMessage) -> Self {
        Message {
            // unknown role tags decode as user; the window never contains
            // anything else written by this crate
            role: if s.r == "a" { Role::Assistant } else { Role::User },
            content: s.c.clone(),
            timestamp: Utc
                .timestamp_opt(s.t, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Redis key for one session's history window.
pub fn session_key(sid: &str) -> String {
    format!("chat:session:{sid}:history")
}

pub fn encode_window(messages: &[Message]) -> Result<String> {
    let stored: Vec<StoredMessage> = messages.iter().map(StoredMessage::from).collect();
    Ok(serde_json::to_string(&stored)?)
}

pub fn decode_window(raw: &str) -> Result<Vec<Message>> {
    let stored: Vec<StoredMessage> = serde_json::from_str(raw)?;
    Ok(stored.iter().map(Message::from).collect())
}

/// Append at the tail and drop from the head until the window fits.
pub fn push_bounded(window: &mut Vec<Message>, message: Message, cap: usize) {
    window.push(message);
    while window.len() > cap {
        window.remove(0);
    }
}
