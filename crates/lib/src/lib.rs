//! Relay core library: per-conversation dispatch, request handling, Telegram transport,
//! and the OpenAI-compatible completion provider used by the `relay` binary.

pub mod allowlist;
pub mod channels;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod gateway;
pub mod handler;
pub mod init;
pub mod llm;
pub mod waiting;
