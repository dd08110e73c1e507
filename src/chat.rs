use serde::{Deserialize, Serialize};

use crate::store::unix_ms;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: u64,
    /// Model that produced the reply; only set on assistant messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Message {
    pub fn user(content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.to_string(),
            timestamp: unix_ms(),
            model: None,
        }
    }

    pub fn assistant(content: &str, model: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.to_string(),
            timestamp: unix_ms(),
            model,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Conversation {
    pub fn new(title: &str) -> Self {
        let now = unix_ms();
        Self {
            id: new_conversation_id(),
            title: title.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Timestamp plus random suffix: practically unique, not globally unique.
fn new_conversation_id() -> String {
    let suffix: String = (0..9).map(|_| fastrand::alphanumeric()).collect();
    format!("conv_{}_{}", unix_ms(), suffix)
}

/// Sidebar title for a conversation: the first user message clipped to 50
/// characters, with a trailing ellipsis when clipped.
pub fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f64,
    /// -1 means unlimited.
    pub max_tokens: i64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: -1,
        }
    }
}
