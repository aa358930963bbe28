//! Integration tests for the Telegram and OpenAI HTTP adapters against local axum mocks.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use relay::channels::{ProgressSignal, SendOptions, TelegramChannel, Transport, TransportError};
use relay::context::ContextMessage;
use relay::handler::{self, RequestError};
use relay::llm::{CompletionProvider, OpenAiClient, ProviderError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Calls = Arc<Mutex<Vec<(String, Value)>>>;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Fake Bot API: rejects any sendMessage that asks for a parse mode, like Telegram does for bad Markdown.
async fn bot_method(
    State(calls): State<Calls>,
    Path((_bot, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    calls.lock().unwrap().push((method.clone(), body.clone()));
    match method.as_str() {
        "sendMessage" if body.get("parse_mode").is_some() => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "description": "Bad Request: can't parse entities" })),
        ),
        "getFile" => (
            StatusCode::OK,
            Json(json!({ "ok": true, "result": { "file_id": body["file_id"], "file_path": "photos/file_0.jpg" } })),
        ),
        _ => (StatusCode::OK, Json(json!({ "ok": true, "result": true }))),
    }
}

async fn telegram_mock() -> (String, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/:bot/:method", post(bot_method))
        .with_state(calls.clone());
    (spawn(app).await, calls)
}

#[tokio::test]
async fn telegram_markdown_rejection_falls_back_to_plain_text() {
    let (base, calls) = telegram_mock().await;
    let channel = TelegramChannel::new(Some("T0K".to_string()), Some(base));

    channel
        .send_text(12, "*unbalanced", SendOptions::markdown())
        .await
        .expect("plain-text retry succeeds");

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1["parse_mode"], "Markdown");
    assert_eq!(calls[1].0, "sendMessage");
    assert!(calls[1].1.get("parse_mode").is_none());
    assert_eq!(calls[1].1["chat_id"], 12);
    assert_eq!(calls[1].1["text"], "*unbalanced");
}

#[tokio::test]
async fn telegram_chat_action_and_photo() {
    let (base, calls) = telegram_mock().await;
    let channel = TelegramChannel::new(Some("T0K".to_string()), Some(base));

    channel
        .send_progress_signal(3, ProgressSignal::UploadPhoto)
        .await
        .expect("chat action");
    channel
        .send_photo(3, "https://images.test/cat.png")
        .await
        .expect("photo");

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls[0].0, "sendChatAction");
    assert_eq!(calls[0].1["action"], "upload_photo");
    assert_eq!(calls[1].0, "sendPhoto");
    assert_eq!(calls[1].1["photo"], "https://images.test/cat.png");
}

#[tokio::test]
async fn telegram_resolves_file_download_url() {
    let (base, _calls) = telegram_mock().await;
    let channel = TelegramChannel::new(Some("T0K".to_string()), Some(base.clone()));

    let url = channel.resolve_image_url("abc").await.expect("getFile");
    assert_eq!(url, format!("{}/file/botT0K/photos/file_0.jpg", base));
}

#[tokio::test]
async fn telegram_request_errors_do_not_leak_the_token() {
    // Nothing listens on the discard port, so the request itself fails.
    let channel = TelegramChannel::new(
        Some("123:SECRETTOKEN".to_string()),
        Some("http://127.0.0.1:9".to_string()),
    );
    let err = channel.resolve_image_url("abc").await.expect_err("unreachable api");
    assert!(matches!(err, TransportError::Request(_)), "{:?}", err);
    assert!(!err.to_string().contains("SECRETTOKEN"), "{}", err);

    let request_err = RequestError::from(err);
    assert!(!request_err.to_string().contains("SECRETTOKEN"));
    assert_eq!(request_err.user_message(), handler::IMAGE_FETCH_REPLY);
}

#[tokio::test]
async fn telegram_without_token_is_not_configured() {
    let channel = TelegramChannel::new(None, None);
    let err = channel
        .send_text(1, "hi", SendOptions::default())
        .await
        .expect_err("no token");
    assert!(matches!(err, TransportError::NotConfigured));
}

async fn chat_completions(State(calls): State<Calls>, Json(body): Json<Value>) -> Json<Value> {
    calls
        .lock()
        .unwrap()
        .push(("chat".to_string(), body.clone()));
    let count = body["messages"].as_array().map(|m| m.len()).unwrap_or(0);
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": format!("saw {} messages", count) } }]
    }))
}

async fn image_generations(
    State(calls): State<Calls>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    calls
        .lock()
        .unwrap()
        .push(("image".to_string(), body.clone()));
    if body["prompt"] == "forbidden" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "content policy violation" } })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "data": [{ "url": "https://images.test/generated.png" }] })),
    )
}

async fn openai_mock() -> (String, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/images/generations", post(image_generations))
        .with_state(calls.clone());
    (spawn(app).await, calls)
}

#[tokio::test]
async fn openai_complete_sends_history_with_image_parts() {
    let (base, calls) = openai_mock().await;
    let client = OpenAiClient::new(Some(base), Some("sk-test".to_string()), Duration::from_secs(10))
        .expect("client");
    let history = vec![
        ContextMessage::user("hello"),
        ContextMessage::assistant("hi there"),
        ContextMessage::user_with_image("what is this", "https://files.test/p.jpg"),
    ];

    let reply = client.complete("gpt-4o", &history).await.expect("complete");
    assert_eq!(reply, "saw 3 messages");

    let calls = calls.lock().unwrap().clone();
    let body = &calls[0].1;
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["messages"][0]["content"], "hello");
    assert_eq!(body["messages"][1]["role"], "assistant");
    assert_eq!(body["messages"][2]["content"][0]["type"], "text");
    assert_eq!(body["messages"][2]["content"][1]["type"], "image_url");
    assert_eq!(
        body["messages"][2]["content"][1]["image_url"]["url"],
        "https://files.test/p.jpg"
    );
}

#[tokio::test]
async fn openai_image_generation_and_api_error() {
    let (base, calls) = openai_mock().await;
    let client = OpenAiClient::new(Some(base), None, Duration::from_secs(10))
        .expect("client")
        .with_image_settings("dall-e-2", "512x512");

    let url = client.generate_image("a lighthouse").await.expect("image");
    assert_eq!(url, "https://images.test/generated.png");

    let err = client
        .generate_image("forbidden")
        .await
        .expect_err("api error");
    match err {
        ProviderError::Api(msg) => assert!(msg.contains("content policy violation"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls[0].1["model"], "dall-e-2");
    assert_eq!(calls[0].1["size"], "512x512");
    assert_eq!(calls[0].1["n"], 1);
}
