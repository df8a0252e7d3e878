//! Shared test doubles for dispatcher and relay tests

#![allow(dead_code)]

use alexia_bot::{
    AiError, AuditLog, Business, ChatId, CommandRecord, CompletionBackend, DirectorySearch,
    Dispatcher, HistoryStore, MessageRecord, Transport, TransportError, Turn,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// AI backend that replays scripted results and records its inputs
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    pub calls: Mutex<Vec<(String, Vec<Turn>, Turn)>>,
    pub delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn replying(replies: Vec<Result<String, AiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Turn],
        user_turn: &Turn,
    ) -> Result<String, AiError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), history.to_vec(), user_turn.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::Unavailable("no scripted reply".into())))
    }
}

/// Directory returning a fixed result
pub struct StubDirectory {
    results: Vec<Business>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl StubDirectory {
    pub fn with(results: Vec<Business>) -> Self {
        Self {
            results,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            results: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DirectorySearch for StubDirectory {
    fn search_by_category(&self, _term: &str) -> anyhow::Result<Vec<Business>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("catalog offline");
        }
        Ok(self.results.clone())
    }
}

/// In-memory audit log
#[derive(Default)]
pub struct MemoryAudit {
    pub messages: Mutex<Vec<MessageRecord>>,
    pub commands: Mutex<Vec<CommandRecord>>,
    pub fail: AtomicBool,
}

impl MemoryAudit {
    pub fn failing() -> Self {
        let audit = Self::default();
        audit.fail.store(true, Ordering::SeqCst);
        audit
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }
}

impl AuditLog for MemoryAudit {
    fn record_message(&self, record: &MessageRecord) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database down");
        }
        self.messages.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn record_command(&self, record: &CommandRecord) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database down");
        }
        self.commands.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn count_messages(&self) -> anyhow::Result<u64> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database down");
        }
        Ok(self.message_count() as u64)
    }

    fn count_commands(&self) -> anyhow::Result<u64> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("database down");
        }
        Ok(self.command_count() as u64)
    }
}

/// Transport recording every outbound message
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(ChatId, String)>>,
    pub fail: AtomicBool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.fail.store(true, Ordering::SeqCst);
        transport
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn id(&self) -> &str {
        "recording"
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("chat not found".into()));
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

/// Dispatcher plus handles on all of its collaborators
pub struct Harness {
    pub history: Arc<HistoryStore>,
    pub ai: Arc<ScriptedBackend>,
    pub directory: Arc<StubDirectory>,
    pub audit: Arc<MemoryAudit>,
}

impl Harness {
    pub fn new(ai: ScriptedBackend, directory: StubDirectory, audit: MemoryAudit) -> Self {
        Self {
            history: Arc::new(HistoryStore::default()),
            ai: Arc::new(ai),
            directory: Arc::new(directory),
            audit: Arc::new(audit),
        }
    }

    pub fn with_ai(ai: ScriptedBackend) -> Self {
        Self::new(ai, StubDirectory::with(Vec::new()), MemoryAudit::default())
    }

    pub fn dispatcher(&self) -> Dispatcher {
        let ai: Arc<dyn CompletionBackend> = self.ai.clone();
        let directory: Arc<dyn DirectorySearch> = self.directory.clone();
        let audit: Arc<dyn AuditLog> = self.audit.clone();
        Dispatcher::new(Arc::clone(&self.history), ai, directory, audit)
    }
}
