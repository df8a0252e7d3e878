//! Message and Command Audit Log
//!
//! Records every processed message (with the reply sent) and every command
//! invocation. Writes are best-effort from the caller's point of view: the
//! relay and dispatcher log failures and carry on.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

use crate::history::ChatId;

/// Sender fields copied into audit rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderInfo {
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// One processed message and the reply it got
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub chat_id: ChatId,
    pub sender: SenderInfo,
    pub text: String,
    pub reply: String,
}

/// One command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub chat_id: ChatId,
    pub sender: SenderInfo,
    pub command: String,
}

/// Audit log contract
pub trait AuditLog: Send + Sync {
    fn record_message(&self, record: &MessageRecord) -> Result<()>;
    fn record_command(&self, record: &CommandRecord) -> Result<()>;
    fn count_messages(&self) -> Result<u64>;
    fn count_commands(&self) -> Result<u64>;
}

/// Audit log with SQLite backend
pub struct SqliteAuditLog {
    conn: Mutex<Connection>,
}

impl SqliteAuditLog {
    /// Open or create the audit database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open audit db {}", path.display()))?;
        let log = Self::from_connection(conn)?;

        info!("Audit log opened: {}", path.display());
        Ok(log)
    }

    /// In-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS telegram_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                user_name TEXT,
                first_name TEXT,
                last_name TEXT,
                message_text TEXT NOT NULL,
                bot_response TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bot_commands (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                command TEXT NOT NULL,
                user_name TEXT,
                first_name TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_telegram_messages_chat
                ON telegram_messages(chat_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_bot_commands_chat
                ON bot_commands(chat_id, created_at);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn count(&self, table: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count.max(0) as u64)
    }
}

impl AuditLog for SqliteAuditLog {
    fn record_message(&self, record: &MessageRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO telegram_messages
             (chat_id, user_name, first_name, last_name, message_text, bot_response, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.chat_id,
                record.sender.user_name,
                record.sender.first_name,
                record.sender.last_name,
                record.text,
                record.reply,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        debug!("Message recorded for chat {}", record.chat_id);
        Ok(())
    }

    fn record_command(&self, record: &CommandRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO bot_commands (chat_id, command, user_name, first_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.chat_id,
                record.command,
                record.sender.user_name,
                record.sender.first_name,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        debug!("Command {} recorded for chat {}", record.command, record.chat_id);
        Ok(())
    }

    fn count_messages(&self) -> Result<u64> {
        self.count("telegram_messages")
    }

    fn count_commands(&self) -> Result<u64> {
        self.count("bot_commands")
    }
}
