//! Relay Loop
//!
//! Top-level per-event pipeline: activity gate → dispatcher → outbound send
//! and audit record. Events for the same chat are processed one at a time
//! in arrival order; different chats run concurrently.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace};

use crate::audit::{AuditLog, MessageRecord};
use crate::dispatch::{DispatchResult, Dispatcher, InboundEvent};
use crate::gate::ActivityGate;
use crate::history::ChatId;
use crate::transport::Transport;

/// What happened to one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Gate was inactive; nothing sent, nothing recorded
    Dropped,
    /// Reply delivered
    Delivered(DispatchResult),
    /// Reply produced but the transport refused it
    SendFailed(DispatchResult),
}

pub struct Relay<T: Transport> {
    transport: Arc<T>,
    dispatcher: Dispatcher,
    gate: Arc<ActivityGate>,
    lanes: DashMap<ChatId, Arc<Mutex<()>>>,
}

impl<T: Transport> Relay<T> {
    pub fn new(transport: Arc<T>, dispatcher: Dispatcher, gate: Arc<ActivityGate>) -> Self {
        Self {
            transport,
            dispatcher,
            gate,
            lanes: DashMap::new(),
        }
    }

    pub fn gate(&self) -> &Arc<ActivityGate> {
        &self.gate
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn lane(&self, chat_id: ChatId) -> Arc<Mutex<()>> {
        Arc::clone(self.lanes.entry(chat_id).or_default().value())
    }

    /// Process one inbound event end to end
    pub async fn handle(&self, event: InboundEvent) -> RelayOutcome {
        if !self.gate.is_active() {
            trace!("Bot inactive, ignoring event: chat={}", event.chat_id);
            return RelayOutcome::Dropped;
        }

        let chat_id = event.chat_id;
        let lane = self.lane(chat_id);
        let outcome = {
            let _turn = lane.lock().await;
            self.process(event).await
        };
        self.release_lane(chat_id, lane);
        outcome
    }

    /// Drop the lane unless another event for the chat holds or awaits it
    fn release_lane(&self, chat_id: ChatId, lane: Arc<Mutex<()>>) {
        // One reference in the map, one held here
        self.lanes.remove_if(&chat_id, |_, held| {
            Arc::ptr_eq(held, &lane) && Arc::strong_count(held) == 2
        });
    }

    async fn process(&self, event: InboundEvent) -> RelayOutcome {
        info!(
            "Message received: chat={}, user={:?}, name={:?}, len={}",
            event.chat_id,
            event.sender.user_name,
            event.display_name,
            event.text.len()
        );
        debug!("Message content: chat={}, text={:?}", event.chat_id, event.text);

        let result = self.dispatcher.dispatch(&event).await;

        let record = MessageRecord {
            chat_id: event.chat_id,
            sender: event.sender.clone(),
            text: event.text.clone(),
            reply: result.reply_text.clone(),
        };
        let audit = Arc::clone(self.dispatcher.audit());

        let (sent, _) = tokio::join!(
            self.transport.send_text(event.chat_id, &result.reply_text),
            record_message(audit, record),
        );

        match sent {
            Ok(()) => {
                info!(
                    "Reply sent: chat={}, via={}, kind={}, len={}",
                    event.chat_id,
                    self.transport.id(),
                    result.classification,
                    result.reply_text.len()
                );
                RelayOutcome::Delivered(result)
            }
            Err(e) => {
                error!("Failed to send reply: chat={}, error={}", event.chat_id, e);
                RelayOutcome::SendFailed(result)
            }
        }
    }
}

async fn record_message(audit: Arc<dyn AuditLog>, record: MessageRecord) {
    let chat_id = record.chat_id;
    if let Err(e) = audit.record_message(&record) {
        error!("Failed to record message: chat={}, error={:#}", chat_id, e);
    }
}
