//! Integration test: the webhook endpoint checks the secret token and routes updates to the dispatcher.

use async_trait::async_trait;
use relay::channels::InboundEvent;
use relay::config::Config;
use relay::context::ContextStore;
use relay::dispatch::{Dispatcher, EventHandler};
use relay::gateway::{build_router, GatewayState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Forward(mpsc::UnboundedSender<InboundEvent>);

#[async_trait]
impl EventHandler for Forward {
    async fn handle(&self, _context: &mut ContextStore, event: InboundEvent) -> anyhow::Result<()> {
        let _ = self.0.send(event);
        Ok(())
    }
}

async fn serve(state: GatewayState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, build_router(state)).await;
    });
    format!("http://{}", addr)
}

fn update(chat_id: i64, text: &str) -> serde_json::Value {
    json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "chat": { "id": chat_id },
            "from": { "id": 77 },
            "text": text,
        }
    })
}

#[tokio::test]
async fn webhook_rejects_wrong_secret_and_routes_valid_update() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(Forward(tx))));
    let state = GatewayState {
        config: Arc::new(Config::default()),
        dispatcher: dispatcher.clone(),
        webhook_secret: Some("s3cret".to_string()),
    };
    let base = serve(state).await;
    let client = reqwest::Client::new();
    let url = format!("{}/telegram/webhook", base);

    let denied = client
        .post(&url)
        .header("X-Telegram-Bot-Api-Secret-Token", "wrong")
        .json(&update(5, "hello"))
        .send()
        .await
        .expect("post");
    assert_eq!(denied.status().as_u16(), 403);
    assert_eq!(dispatcher.conversation_count(), 0);

    let accepted = client
        .post(&url)
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .json(&update(5, "hello"))
        .send()
        .await
        .expect("post");
    assert_eq!(accepted.status().as_u16(), 200);

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event routed in time")
        .expect("event");
    assert_eq!(event.conversation_id, 5);
    assert_eq!(event.sender_id, 77);
    assert_eq!(event.text.as_deref(), Some("hello"));

    let health: serde_json::Value = client
        .get(format!("{}/", base))
        .send()
        .await
        .expect("get")
        .json()
        .await
        .expect("json");
    assert_eq!(health["conversations"], 1);
}

#[tokio::test]
async fn webhook_rejects_malformed_body() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let state = GatewayState {
        config: Arc::new(Config::default()),
        dispatcher: Arc::new(Dispatcher::new(Arc::new(Forward(tx)))),
        webhook_secret: None,
    };
    let base = serve(state).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/telegram/webhook", base))
        .body("not json")
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status().as_u16(), 400);
}
