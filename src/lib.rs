//! Alexia Bot
//!
//! Telegram assistant that answers every text message exactly once:
//! bot commands, business directory searches, or AI-generated replies
//! with a bounded per-chat conversation window.
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► Relay ──► ActivityGate ──► Dispatcher ──┬── CommandTable
//!                │          (on/off)                   ├── DirectorySearch (SQLite)
//!                │                                     └── HistoryStore + AI backend
//!                ├── Transport::send_text  (reply)
//!                └── AuditLog::record_message (SQLite, best-effort)
//!
//! Operator ──► Control API (axum) ──► ActivityGate / HistoryStore / AuditLog
//! ```

pub mod ai;
pub mod audit;
pub mod commands;
pub mod config;
pub mod control;
pub mod directory;
pub mod dispatch;
pub mod gate;
pub mod history;
pub mod relay;
pub mod telegram;
pub mod transport;

pub use ai::{AiError, CompletionBackend, GrokClient};
pub use audit::{AuditLog, CommandRecord, MessageRecord, SenderInfo, SqliteAuditLog};
pub use commands::{CommandReply, CommandTable};
pub use config::{AiSettings, Config};
pub use control::ControlState;
pub use directory::{Business, BusinessDirectory, DirectorySearch};
pub use dispatch::{Classification, DispatchResult, Dispatcher, InboundEvent};
pub use gate::ActivityGate;
pub use history::{ChatId, HistoryStore, Role, Turn};
pub use relay::{Relay, RelayOutcome};
pub use transport::{Transport, TransportError};
