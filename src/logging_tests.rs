//! Logging Tests
//!
//! Captures subscriber output while driving the handler to check that:
//! - forwarded text and sender are logged
//! - rejected callbacks are logged at WARN
//! - JSON output is parseable line by line
//! - secrets never reach the log
//! - detached forwarding failures keep the callback's request id

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::Level;
use tracing_subscriber::fmt;

use crate::crypto;
use crate::dispatch::{DispatchRequest, Forwarder};
use crate::error::{BridgeError, Result};
use crate::handler::WebhookHandler;

const SECRET_KEY: &str = "log-test-secret-key";

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct NullForwarder;

#[async_trait]
impl Forwarder for NullForwarder {
    async fn forward(&self, _request: &DispatchRequest) -> Result<()> {
        Ok(())
    }
}

struct DownForwarder;

#[async_trait]
impl Forwarder for DownForwarder {
    async fn forward(&self, _request: &DispatchRequest) -> Result<()> {
        Err(BridgeError::Forwarding("down".to_string()))
    }
}

/// Run `body` through a fresh handler with a capturing subscriber installed
fn capture(json_format: bool, body: Value) -> String {
    let handler = WebhookHandler::new(
        Some(SECRET_KEY.to_string()),
        "feishu_trigger",
        Arc::new(NullForwarder),
    );
    capture_with(json_format, handler, body)
}

fn capture_with(json_format: bool, handler: WebhookHandler, body: Value) -> String {
    let buffer = Buffer::default();
    let writer = buffer.clone();
    let make_writer = move || writer.clone();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    // The sleep lets detached forwards finish under the same subscriber
    let run = || {
        runtime.block_on(async {
            handler.handle(body).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
    };

    if json_format {
        let subscriber = fmt()
            .json()
            .with_max_level(Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::with_default(subscriber, run);
    } else {
        let subscriber = fmt()
            .compact()
            .with_ansi(false)
            .with_max_level(Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::with_default(subscriber, run);
    }

    buffer.contents()
}

fn message_event(text: &str) -> Value {
    json!({
        "header": {"event_type": "im.message.receive_v1"},
        "event": {
            "sender": {"sender_id": {"open_id": "ou_log"}},
            "message": {"content": json!({"text": text}).to_string()}
        }
    })
}

#[test]
fn test_forwarded_text_is_logged() {
    let output = capture(false, message_event("ship it"));
    assert!(output.contains("Forwarding to dispatch: ship it"), "{}", output);
    assert!(output.contains("ou_log"));
}

#[test]
fn test_rejected_callback_logged_at_warn() {
    let output = capture(false, json!({"encrypt": "%%%"}));
    assert!(output.contains("WARN"), "{}", output);
    assert!(output.contains("Rejecting callback"));
}

#[test]
fn test_json_output_is_parseable() {
    let output = capture(true, message_event("hello"));
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    assert!(!lines.is_empty());
    for line in lines {
        let parsed: Value = serde_json::from_str(line).unwrap();
        assert!(parsed.get("level").is_some());
    }
}

#[test]
fn test_secret_key_not_logged() {
    let blob = crypto::encrypt(&message_event("sealed"), SECRET_KEY).unwrap();
    let output = capture(false, json!({ "encrypt": blob }));
    assert!(output.contains("sealed"));
    assert!(!output.contains(SECRET_KEY));
}

#[test]
fn test_detached_failure_keeps_request_id() {
    let handler =
        WebhookHandler::new(None, "feishu_trigger", Arc::new(DownForwarder)).detached(true);
    let output = capture_with(true, handler, message_event("later"));

    let lines: Vec<Value> = output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let request_id = |line: &Value| line["span"]["request_id"].as_str().map(str::to_string);

    let forwarding = lines
        .iter()
        .find(|l| l["fields"]["message"].as_str().unwrap_or("").starts_with("Forwarding to dispatch"))
        .expect("forwarding line");
    let failure = lines
        .iter()
        .find(|l| l["fields"]["message"].as_str().unwrap_or("").starts_with("Failed to forward message"))
        .expect("failure line");

    assert_eq!(failure["level"], "WARN");
    assert!(request_id(failure).is_some(), "{}", output);
    assert_eq!(request_id(failure), request_id(forwarding));
}
