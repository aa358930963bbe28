//! Dispatcher: routes inbound events to the worker for their conversation.

use crate::channels::{ConversationId, InboundEvent};
use crate::dispatch::worker::{spawn_worker, EventHandler};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Owns one worker queue per conversation. Workers are created on first sight of a
/// conversation id and live for the rest of the process.
pub struct Dispatcher {
    workers: DashMap<ConversationId, mpsc::UnboundedSender<InboundEvent>>,
    handler: Arc<dyn EventHandler>,
    runtime: Handle,
}

impl Dispatcher {
    /// Must be called from within a tokio runtime; workers are spawned onto it.
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            workers: DashMap::new(),
            handler,
            runtime: Handle::current(),
        }
    }

    /// Enqueue `event` on its conversation's worker, creating the worker if needed.
    /// Never waits for processing; safe to call from any number of producers at once.
    pub fn route(&self, event: InboundEvent) {
        let conversation_id = event.conversation_id;
        // The entry lock makes lookup-or-create atomic: concurrent first arrivals for the
        // same id see exactly one worker.
        let tx = self
            .workers
            .entry(conversation_id)
            .or_insert_with(|| spawn_worker(&self.runtime, conversation_id, self.handler.clone()))
            .clone();
        if tx.send(event).is_err() {
            log::error!("dispatch: worker {} is gone, dropping event", conversation_id);
        }
    }

    /// Number of conversations that have a worker.
    pub fn conversation_count(&self) -> usize {
        self.workers.len()
    }

    pub fn has_worker(&self, conversation_id: ConversationId) -> bool {
        self.workers.contains_key(&conversation_id)
    }
}
