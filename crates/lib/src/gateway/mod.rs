//! Gateway: process wiring plus the HTTP surface (health probe and Telegram webhook).

mod server;

pub use server::{build_router, run_gateway, GatewayState};
