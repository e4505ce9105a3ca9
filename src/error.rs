//! Bridge Error Types
//!
//! Errors that can occur while opening, routing, or forwarding a Feishu
//! callback. Only the first two variants ever reach the platform; the rest
//! are logged and counted.

/// Error types for callback handling
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A required secret or endpoint is not configured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The encrypted envelope could not be opened
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// The message could not be forwarded to the dispatch endpoint
    #[error("Forwarding error: {0}")]
    Forwarding(String),

    /// A call to the Feishu open platform failed
    #[error("Feishu API error: {0}")]
    Feishu(String),
}

impl BridgeError {
    /// Message returned to the platform when this error aborts a callback
    pub fn response_message(&self) -> &'static str {
        match self {
            BridgeError::Configuration(_) => "Configuration Error",
            BridgeError::Decryption(_) => "Decryption Failed",
            BridgeError::Forwarding(_) | BridgeError::Feishu(_) => "ok",
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Configuration(_) => "configuration",
            BridgeError::Decryption(_) => "decryption",
            BridgeError::Forwarding(_) => "forwarding",
            BridgeError::Feishu(_) => "feishu",
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Forwarding(err.to_string())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
