//! Feishu Bridge Library
//!
//! Receives Feishu event subscription callbacks, opens encrypted envelopes,
//! answers URL verification handshakes and forwards incoming chat messages to
//! a GitHub `repository_dispatch` endpoint.

pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod feishu;
pub mod handler;
pub mod metrics;
pub mod server;

#[cfg(test)]
mod logging_tests;

pub use config::BridgeConfig;
pub use error::BridgeError;
pub use handler::WebhookHandler;
