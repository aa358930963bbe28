//! Per-conversation dispatch.
//!
//! One shared inbound stream fans out to one worker per conversation. Each worker drains an
//! unbounded FIFO queue on its own task, so a conversation's events are handled one at a time
//! and in arrival order, while different conversations proceed in parallel.

mod router;
mod worker;

pub use router::Dispatcher;
pub use worker::EventHandler;
