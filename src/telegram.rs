//! Telegram integration
//!
//! Long-polling runner that turns Telegram text messages into
//! [`InboundEvent`]s for the relay, and the [`TelegramTransport`] used to
//! deliver replies.
//!
//! teloxide's dispatcher already processes updates of one chat
//! sequentially; the relay's per-chat lanes keep that guarantee for any
//! other caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use teloxide::{
    dispatching::{Dispatcher as UpdateDispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::Update,
};

use crate::ai::GrokClient;
use crate::audit::{AuditLog, SenderInfo, SqliteAuditLog};
use crate::config::Config;
use crate::control::{self, ControlState};
use crate::directory::{BusinessDirectory, DirectorySearch};
use crate::dispatch::{Dispatcher, InboundEvent};
use crate::gate::ActivityGate;
use crate::history::{ChatId as ConversationId, HistoryStore};
use crate::relay::Relay;
use crate::transport::{Transport, TransportError};

/// Telegram rejects messages above 4096 characters; stay below it
const MAX_CHUNK: usize = 4000;

/// Outbound side of the Telegram bot
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn send_text(&self, chat_id: ConversationId, text: &str) -> Result<(), TransportError> {
        let chat = ChatId(chat_id);

        for chunk in split_message(text, MAX_CHUNK) {
            self.bot
                .send_message(chat, chunk)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }
}

/// Split on UTF-8 boundaries into chunks of at most `max` bytes
pub fn split_message(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        let split_at = remaining
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|end| *end <= max)
            .last()
            .unwrap_or_else(|| remaining.chars().next().map(char::len_utf8).unwrap_or(remaining.len()));
        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        remaining = rest;
    }
    chunks
}

/// Convert a Telegram message into an inbound event (text messages only)
fn to_event(msg: &Message) -> Option<InboundEvent> {
    let text = msg.text()?;
    let event = InboundEvent {
        timestamp: msg.date,
        ..InboundEvent::text(msg.chat.id.0, text)
    };

    Some(match msg.from.as_ref() {
        Some(user) => event.with_sender(
            user.id.0 as i64,
            SenderInfo {
                user_name: user.username.clone(),
                first_name: Some(user.first_name.clone()),
                last_name: user.last_name.clone(),
            },
        ),
        None => event,
    })
}

/// Run the Telegram bot with long polling plus the operator control API
pub async fn run_telegram_bot(config: Config) -> Result<()> {
    let token = config.require_telegram_token()?.to_string();

    let history = Arc::new(HistoryStore::new(config.history_window));
    let ai = Arc::new(GrokClient::new(config.ai.clone()).context("Failed to build AI client")?);
    let audit = Arc::new(SqliteAuditLog::open(&config.db_path)?);
    let directory = Arc::new(BusinessDirectory::open(&config.db_path)?);
    let gate = Arc::new(ActivityGate::new(config.start_active));

    tracing::info!("===========================================");
    tracing::info!("  Alexia Telegram - Starting...");
    tracing::info!("===========================================");
    tracing::info!("Bot username: @{}", config.bot_username);
    tracing::info!("Database: {:?}", config.db_path);
    tracing::info!("History window: {} turns", history.window());
    if ai.is_available() {
        tracing::info!("AI backend: {} ({})", config.ai.model, config.ai.api_url);
    } else {
        tracing::warn!("GROK_API_KEY not set - free-text messages will be echoed");
    }

    let bot = Bot::new(token);

    // Verify bot token by calling getMe
    tracing::info!("Verifying bot token...");
    match bot.get_me().await {
        Ok(me) => {
            tracing::info!(
                "Bot authenticated: @{} (ID: {})",
                me.username.as_deref().unwrap_or("unknown"),
                me.id
            );
        }
        Err(e) => {
            tracing::error!("Failed to authenticate bot: {}", e);
            anyhow::bail!("Bot authentication failed: {}", e);
        }
    }

    // Delete any existing webhook to ensure polling works
    tracing::info!("Clearing webhook (if any)...");
    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!("Failed to delete webhook: {} (continuing anyway)", e);
    }

    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let search: Arc<dyn DirectorySearch> = directory.clone();
    let audit_log: Arc<dyn AuditLog> = audit.clone();
    let dispatcher = Dispatcher::new(Arc::clone(&history), ai, search, audit_log);
    let relay = Arc::new(Relay::new(transport, dispatcher, Arc::clone(&gate)));

    let control_state = Arc::new(ControlState {
        gate,
        history,
        audit,
        directory,
        transport: "telegram".to_string(),
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION"),
    });
    let control_addr = config.control_addr;
    tokio::spawn(async move {
        if let Err(e) = control::serve(control_state, control_addr).await {
            tracing::error!("Control API stopped: {:#}", e);
        }
    });

    if relay.gate().is_active() {
        tracing::info!("Bot starts ACTIVE");
    } else {
        tracing::info!("Bot starts INACTIVE - POST /api/bot/start to begin processing");
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(message_handler));

    tracing::info!("Starting dispatcher with long polling...");

    UpdateDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in message handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

/// Message handler endpoint for the dispatcher
async fn message_handler(msg: Message, relay: Arc<Relay<TelegramTransport>>) -> ResponseResult<()> {
    match to_event(&msg) {
        Some(event) => {
            relay.handle(event).await;
        }
        None => {
            tracing::trace!("Ignoring non-text message in chat {}", msg.chat.id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_single_chunk() {
        let chunks = split_message("Hola, mundo", MAX_CHUNK);
        assert_eq!(chunks, vec!["Hola, mundo"]);
    }

    #[test]
    fn test_exact_boundary_message() {
        let msg = "a".repeat(MAX_CHUNK);
        let chunks = split_message(&msg, MAX_CHUNK);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), MAX_CHUNK);
    }

    #[test]
    fn test_long_message_splits_in_order() {
        let msg = "b".repeat(MAX_CHUNK * 2 + 10);
        let chunks = split_message(&msg, MAX_CHUNK);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 10);
        assert_eq!(chunks.concat(), msg);
    }

    #[test]
    fn test_multibyte_never_split_mid_char() {
        let msg = "ñ".repeat(5); // 10 bytes
        let chunks = split_message(&msg, 3);
        assert!(chunks.iter().all(|c| c.len() <= 3 && c.chars().all(|ch| ch == 'ñ')));
        assert_eq!(chunks.concat(), msg);
    }

    #[test]
    fn test_empty_message_no_chunks() {
        assert!(split_message("", MAX_CHUNK).is_empty());
    }
}
