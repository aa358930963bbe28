//! Worker: sequential consumer loop bound to one conversation.

use crate::channels::{ConversationId, InboundEvent};
use crate::context::ContextStore;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Handles one inbound event at a time for a conversation.
///
/// `context` belongs to the calling worker; no other task reads or writes it.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, context: &mut ContextStore, event: InboundEvent) -> anyhow::Result<()>;
}

/// Spawn the consumer loop for `conversation_id` and return the sending half of its queue.
/// The loop ends only when every sender is dropped.
pub(crate) fn spawn_worker(
    runtime: &Handle,
    conversation_id: ConversationId,
    handler: Arc<dyn EventHandler>,
) -> mpsc::UnboundedSender<InboundEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    runtime.spawn(run_worker(conversation_id, handler, rx));
    log::debug!("worker {}: started", conversation_id);
    tx
}

async fn run_worker(
    conversation_id: ConversationId,
    handler: Arc<dyn EventHandler>,
    mut rx: mpsc::UnboundedReceiver<InboundEvent>,
) {
    let mut context = ContextStore::new();
    while let Some(event) = rx.recv().await {
        let outcome = AssertUnwindSafe(handler.handle(&mut context, event))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("worker {}: error processing event: {:#}", conversation_id, e);
            }
            Err(_) => {
                log::error!("worker {}: handler panicked while processing event", conversation_id);
            }
        }
    }
    log::debug!("worker {}: queue closed, stopping", conversation_id);
}
