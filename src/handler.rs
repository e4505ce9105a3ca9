//! Webhook Handler
//!
//! Handles one Feishu callback: open the envelope, answer the URL
//! verification handshake, relay `im.message.receive_v1` messages to the
//! dispatch endpoint, acknowledge everything else.
//!
//! Nothing is kept between callbacks. Forwarding failures are logged and
//! never change the acknowledgment, so a downstream outage does not make
//! Feishu retry the event.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::config::BridgeConfig;
use crate::crypto;
use crate::dispatch::{DispatchRequest, Forwarder, GithubDispatcher};
use crate::error::{BridgeError, Result};
use crate::event::{CallbackEvent, CallbackResponse, ReceivedMessage};
use crate::metrics;

/// Stateless callback handler with injected configuration
pub struct WebhookHandler {
    encrypt_key: Option<String>,
    event_type: String,
    detached: bool,
    forwarder: Arc<dyn Forwarder>,
}

impl WebhookHandler {
    /// Build a handler that forwards through the given forwarder
    pub fn new(
        encrypt_key: Option<String>,
        event_type: impl Into<String>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        Self {
            encrypt_key,
            event_type: event_type.into(),
            detached: false,
            forwarder,
        }
    }

    /// Build a handler posting to the configured repository
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let dispatcher = GithubDispatcher::new(&config.dispatch)?;
        Ok(Self::new(
            config.feishu.encrypt_key.clone(),
            config.dispatch.event_type.clone(),
            Arc::new(dispatcher),
        )
        .detached(config.dispatch.detached))
    }

    /// Forward on a spawned task instead of awaiting it
    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    /// Handle one callback body and produce the acknowledgment
    #[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
    pub async fn handle(&self, body: Value) -> CallbackResponse {
        let payload = match self.open(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Rejecting callback: {}", e);
                metrics::record_callback(e.kind());
                return CallbackResponse::from_error(&e);
            }
        };

        let event = CallbackEvent::classify(payload);
        debug!(event = event.label(), "Callback classified");

        match event {
            CallbackEvent::Challenge(challenge) => {
                info!("Answering URL verification challenge");
                metrics::record_callback("challenge");
                return CallbackResponse::challenge(challenge);
            }
            CallbackEvent::MessageReceive(event) => {
                metrics::record_callback("message");
                self.relay(&event).await;
            }
            CallbackEvent::Other(_) => {
                metrics::record_callback("ignored");
            }
        }

        CallbackResponse::ok()
    }

    /// Decrypt the body if it is an `{"encrypt": ...}` envelope
    pub fn open(&self, body: Value) -> Result<Value> {
        // Falsy values mean a plain body; Some(None) marks a non-string envelope
        let sealed: Option<Option<String>> = match body.get("encrypt") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => None,
            Some(Value::String(blob)) if blob.is_empty() => None,
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => None,
            Some(sealed) => Some(sealed.as_str().map(str::to_string)),
        };
        let Some(sealed) = sealed else {
            return Ok(body);
        };

        let key = self.encrypt_key.as_deref().ok_or_else(|| {
            BridgeError::Configuration("FEISHU_ENCRYPT_KEY is not set".to_string())
        })?;

        let blob = sealed
            .ok_or_else(|| BridgeError::Decryption("encrypt field is not a string".to_string()))?;

        crypto::decrypt(&blob, key)
    }

    async fn relay(&self, event: &Value) {
        let message = match ReceivedMessage::from_event(event) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to forward message: {}", e);
                metrics::DISPATCHES_TOTAL.with_label_values(&["invalid"]).inc();
                return;
            }
        };

        info!(user_id = %message.open_id, "Forwarding to dispatch: {}", message.text);
        let request = DispatchRequest::new(self.event_type.clone(), message);

        if self.detached {
            let forwarder = Arc::clone(&self.forwarder);
            tokio::spawn(
                async move {
                    if let Err(e) = forwarder.forward(&request).await {
                        warn!("Failed to forward message: {}", e);
                    }
                }
                .instrument(tracing::Span::current()),
            );
        } else if let Err(e) = self.forwarder.forward(&request).await {
            warn!("Failed to forward message: {}", e);
        }
    }
}
