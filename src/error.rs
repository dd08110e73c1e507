use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {status}")]
    Status { status: u16, body: Value },

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
}
