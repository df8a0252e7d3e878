//! Bot command table
//!
//! Maps a command token (e.g. `/start`) to its reply. Every reply is fixed
//! text except `/status`, which is rendered from live audit counters.

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Leading character that marks a command
pub const COMMAND_MARKER: char = '/';

pub const START_MESSAGE: &str = "👋 ¡Hola! Soy Alexia, tu asistente virtual.\n\n\
    Puedes conversar conmigo libremente o buscar negocios por categoría.\n\n\
    Escribe /help para ver los comandos disponibles.";

pub const HELP_MESSAGE: &str = "📖 Comandos disponibles:\n\n\
    /start - Mensaje de bienvenida\n\
    /help - Mostrar esta ayuda\n\
    /status - Estado del bot\n\n\
    🔍 Búsqueda de negocios:\n\
    buscar [categoría] - Ejemplo: buscar panadería\n\n\
    💬 Cualquier otro mensaje será respondido por la IA.";

pub const UNKNOWN_COMMAND_MESSAGE: &str =
    "❓ Comando no reconocido. Escribe /help para ver los comandos disponibles.";

/// What a command resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReply {
    /// Static reply text
    Fixed(&'static str),
    /// Reply rendered from live counters
    Status,
}

static COMMANDS: Lazy<HashMap<&'static str, CommandReply>> = Lazy::new(|| {
    HashMap::from([
        ("/start", CommandReply::Fixed(START_MESSAGE)),
        ("/help", CommandReply::Fixed(HELP_MESSAGE)),
        ("/status", CommandReply::Status),
    ])
});

/// Counters shown by `/status`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounters {
    pub messages: u64,
    pub commands: u64,
}

/// Static command lookup
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTable;

impl CommandTable {
    pub fn new() -> Self {
        Self
    }

    /// Normalized command token: first whitespace-delimited word, lowercased
    pub fn token(text: &str) -> String {
        text.split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Exact lookup; unknown tokens yield `None`
    pub fn lookup(&self, token: &str) -> Option<CommandReply> {
        COMMANDS.get(token).copied()
    }
}

/// Render the `/status` reply
pub fn format_status(counters: StatusCounters, now: DateTime<Local>) -> String {
    format!(
        "📊 Estado del bot\n\n\
        ✅ Bot activo\n\
        💬 Mensajes procesados: {}\n\
        ⚙️ Comandos ejecutados: {}\n\
        🕐 Hora: {}",
        counters.messages,
        counters.commands,
        now.format("%d/%m/%Y %H:%M:%S")
    )
}
