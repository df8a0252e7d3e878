//! Transport capability contract
//!
//! What the relay needs from a messaging platform: an identity and a way
//! to deliver text to a chat. Inbound events are pushed into the relay by
//! the platform runner (see `telegram::run_telegram_bot`).

use async_trait::async_trait;

use crate::history::ChatId;

/// Error types for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Send failed: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport identifier (e.g. "telegram")
    fn id(&self) -> &str;

    /// Deliver a text reply to a chat
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;
}
