//! Message Dispatcher
//!
//! Classifies an inbound message and produces exactly one reply:
//!
//! 1. `/command` → command table (`/status` is rendered from audit counters)
//! 2. `buscar <categoría>` → business directory
//! 3. anything else → AI backend with the chat's history window, falling
//!    back to an echo of the user's text when the backend fails
//!
//! Failures of collaborators never escape: they become a reply string.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::ai::CompletionBackend;
use crate::audit::{AuditLog, CommandRecord, SenderInfo};
use crate::commands::{format_status, CommandReply, CommandTable, StatusCounters, COMMAND_MARKER, UNKNOWN_COMMAND_MESSAGE};
use crate::directory::{format_results, DirectorySearch};
use crate::history::{ChatId, HistoryStore, Turn};

/// Search prefix, matched ASCII case-insensitively, trailing space included
pub const SEARCH_KEYWORD: &str = "buscar ";

/// Prepended to the user's text when the AI backend cannot answer
pub const ECHO_PREFIX: &str = "🤖 Eco: ";

pub const SEARCH_EMPTY_TERM_REPLY: &str =
    "❌ Por favor especifica una categoría.\n\nEjemplo: buscar panadería";

pub const SEARCH_ERROR_REPLY: &str =
    "❌ Error al buscar negocios. Por favor intenta nuevamente.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "Eres un asistente útil, amigable y conversacional. \
    Respondes en español de manera clara y concisa. \
    Eres servicial y proporcionas información precisa.";

/// An inbound chat message, as delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub sender_id: i64,
    pub display_name: String,
    pub sender: SenderInfo,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    /// Plain text event with an anonymous sender
    pub fn text(chat_id: ChatId, text: &str) -> Self {
        Self {
            chat_id,
            sender_id: chat_id,
            display_name: String::new(),
            sender: SenderInfo::default(),
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_sender(mut self, sender_id: i64, sender: SenderInfo) -> Self {
        self.display_name = sender
            .first_name
            .clone()
            .or_else(|| sender.user_name.clone())
            .unwrap_or_default();
        self.sender_id = sender_id;
        self.sender = sender;
        self
    }
}

/// How a message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Command,
    Search,
    Ai,
    FallbackEcho,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Classification::Command => "command",
            Classification::Search => "search",
            Classification::Ai => "ai",
            Classification::FallbackEcho => "fallback-echo",
        };
        f.write_str(s)
    }
}

/// The single reply produced for an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub reply_text: String,
    pub classification: Classification,
}

impl DispatchResult {
    fn new(reply_text: impl Into<String>, classification: Classification) -> Self {
        Self {
            reply_text: reply_text.into(),
            classification,
        }
    }
}

/// Search term if `text` starts with the search keyword
pub fn search_term(text: &str) -> Option<&str> {
    let prefix = text.get(..SEARCH_KEYWORD.len())?;
    if prefix.eq_ignore_ascii_case(SEARCH_KEYWORD) {
        Some(text[SEARCH_KEYWORD.len()..].trim())
    } else {
        None
    }
}

/// Routes events to commands, directory search or the AI pipeline
pub struct Dispatcher {
    history: Arc<HistoryStore>,
    ai: Arc<dyn CompletionBackend>,
    commands: CommandTable,
    directory: Arc<dyn DirectorySearch>,
    audit: Arc<dyn AuditLog>,
    system_prompt: String,
}

impl Dispatcher {
    pub fn new(
        history: Arc<HistoryStore>,
        ai: Arc<dyn CompletionBackend>,
        directory: Arc<dyn DirectorySearch>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            history,
            ai,
            commands: CommandTable::new(),
            directory,
            audit,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    /// Classify and answer one event. Never fails.
    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchResult {
        let result = if event.text.starts_with(COMMAND_MARKER) {
            self.handle_command(event)
        } else if let Some(term) = search_term(&event.text) {
            self.handle_search(term)
        } else {
            self.handle_free_text(event).await
        };

        debug!(
            "Dispatched chat={} as {} (reply_len={})",
            event.chat_id,
            result.classification,
            result.reply_text.len()
        );
        result
    }

    fn handle_command(&self, event: &InboundEvent) -> DispatchResult {
        let command = CommandTable::token(&event.text);
        info!(
            "Command received: chat={}, command={}, user={:?}",
            event.chat_id, command, event.sender.user_name
        );

        let record = CommandRecord {
            chat_id: event.chat_id,
            sender: event.sender.clone(),
            command: command.clone(),
        };
        if let Err(e) = self.audit.record_command(&record) {
            error!("Failed to record command {} for chat {}: {:#}", command, event.chat_id, e);
        }

        let reply = match self.commands.lookup(&command) {
            Some(CommandReply::Fixed(text)) => text.to_string(),
            Some(CommandReply::Status) => format_status(self.status_counters(), Local::now()),
            None => UNKNOWN_COMMAND_MESSAGE.to_string(),
        };
        DispatchResult::new(reply, Classification::Command)
    }

    fn status_counters(&self) -> StatusCounters {
        let messages = self.audit.count_messages().unwrap_or_else(|e| {
            warn!("Failed to count messages: {:#}", e);
            0
        });
        let commands = self.audit.count_commands().unwrap_or_else(|e| {
            warn!("Failed to count commands: {:#}", e);
            0
        });
        StatusCounters { messages, commands }
    }

    fn handle_search(&self, term: &str) -> DispatchResult {
        if term.is_empty() {
            return DispatchResult::new(SEARCH_EMPTY_TERM_REPLY, Classification::Search);
        }

        info!("Business search: category={:?}", term);
        let reply = match self.directory.search_by_category(term) {
            Ok(businesses) => format_results(&businesses, term),
            Err(e) => {
                error!("Business search failed for {:?}: {:#}", term, e);
                SEARCH_ERROR_REPLY.to_string()
            }
        };
        DispatchResult::new(reply, Classification::Search)
    }

    async fn handle_free_text(&self, event: &InboundEvent) -> DispatchResult {
        let chat_id = event.chat_id;
        let user_turn = Turn::user(event.text.as_str());

        // The user turn stays in history even if the backend fails
        let history = self.history.snapshot_then_append(chat_id, user_turn.clone());

        match self.ai.complete(&self.system_prompt, &history, &user_turn).await {
            Ok(reply) if !reply.trim().is_empty() => {
                self.history.append(chat_id, Turn::assistant(reply.as_str()));
                info!(
                    "AI reply generated: chat={}, backend={}, len={}",
                    chat_id,
                    self.ai.name(),
                    reply.len()
                );
                DispatchResult::new(reply, Classification::Ai)
            }
            Ok(_) => {
                warn!("AI backend returned empty text, using echo: chat={}", chat_id);
                self.echo(event)
            }
            Err(e) => {
                warn!("AI backend failed, using echo: chat={}, error={}", chat_id, e);
                self.echo(event)
            }
        }
    }

    fn echo(&self, event: &InboundEvent) -> DispatchResult {
        DispatchResult::new(
            format!("{}{}", ECHO_PREFIX, event.text),
            Classification::FallbackEcho,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_term_parsing() {
        assert_eq!(search_term("buscar panaderia"), Some("panaderia"));
        assert_eq!(search_term("BUSCAR   Farmacia  "), Some("Farmacia"));
        assert_eq!(search_term("Buscar "), Some(""));
        assert_eq!(search_term("buscar"), None);
        assert_eq!(search_term("buscarpan"), None);
        assert_eq!(search_term("quiero buscar pan"), None);
        // Multibyte prefix must not panic on a non-boundary slice
        assert_eq!(search_term("búscar pan"), None);
        assert_eq!(search_term("ññññ"), None);
    }

    #[test]
    fn test_classification_display() {
        assert_eq!(Classification::FallbackEcho.to_string(), "fallback-echo");
        assert_eq!(
            serde_json::to_string(&Classification::FallbackEcho).unwrap(),
            "\"fallback-echo\""
        );
    }

    #[test]
    fn test_event_display_name() {
        let event = InboundEvent::text(1, "hola").with_sender(
            77,
            SenderInfo {
                user_name: Some("maria".into()),
                first_name: None,
                last_name: None,
            },
        );
        assert_eq!(event.display_name, "maria");
        assert_eq!(event.sender_id, 77);
    }
}
