// Repository dispatch forwarding
//
// Turns a received chat message into a `repository_dispatch` event on the
// configured repository. One POST per message, no retries.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::error::{BridgeError, Result};
use crate::event::ReceivedMessage;
use crate::metrics;

/// Media type GitHub expects on the dispatch endpoint
pub const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Body of a repository dispatch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub event_type: String,
    pub client_payload: ClientPayload,
}

/// Data handed to the downstream workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPayload {
    pub user_command: String,
    pub user_id: String,
}

impl DispatchRequest {
    pub fn new(event_type: impl Into<String>, message: ReceivedMessage) -> Self {
        Self {
            event_type: event_type.into(),
            client_payload: ClientPayload {
                user_command: message.text,
                user_id: message.open_id,
            },
        }
    }
}

/// Something that can deliver a dispatch request downstream
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: &DispatchRequest) -> Result<()>;
}

/// Forwarder posting to `<api_base>/repos/<repo>/dispatches`
pub struct GithubDispatcher {
    client: reqwest::Client,
    api_base: String,
    repo: Option<String>,
    token: Option<String>,
}

impl GithubDispatcher {
    /// Create a dispatcher from configuration
    ///
    /// Missing repo/token is not an error here; it is reported per message
    /// so the bridge can still answer handshakes.
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("feishu-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            token: config.token.clone(),
        })
    }

    /// Dispatch endpoint URL for a repository
    pub fn dispatch_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/dispatches", self.api_base, repo)
    }
}

#[async_trait]
impl Forwarder for GithubDispatcher {
    async fn forward(&self, request: &DispatchRequest) -> Result<()> {
        let (Some(repo), Some(token)) = (self.repo.as_deref(), self.token.as_deref()) else {
            metrics::DISPATCHES_TOTAL
                .with_label_values(&["unconfigured"])
                .inc();
            let missing = if self.repo.is_none() {
                "GITHUB_REPO"
            } else {
                "GITHUB_TOKEN"
            };
            return Err(BridgeError::Configuration(format!("{} is not set", missing)));
        };

        let url = self.dispatch_url(repo);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("token {}", token))
            .header(ACCEPT, GITHUB_ACCEPT)
            .json(request)
            .send()
            .await;

        let elapsed = start.elapsed();
        match response {
            Ok(response) => {
                let status = response.status();
                debug!(
                    repo = %repo,
                    status = status.as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Dispatch responded"
                );

                if status.is_success() {
                    metrics::record_dispatch("success", elapsed.as_secs_f64());
                    Ok(())
                } else {
                    metrics::record_dispatch("rejected", elapsed.as_secs_f64());
                    let body = response.text().await.unwrap_or_default();
                    Err(BridgeError::Forwarding(format!(
                        "HTTP {} from {}: {}",
                        status.as_u16(),
                        url,
                        body.trim()
                    )))
                }
            }
            Err(e) => {
                metrics::record_dispatch("error", elapsed.as_secs_f64());
                warn!(repo = %repo, "Dispatch request failed: {}", e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> DispatchConfig {
        DispatchConfig {
            api_base: server.uri(),
            repo: Some("octo/lifeops".to_string()),
            token: Some("ghp_test".to_string()),
            ..DispatchConfig::default()
        }
    }

    fn hello_request() -> DispatchRequest {
        DispatchRequest::new(
            "feishu_trigger",
            ReceivedMessage {
                text: "hello".to_string(),
                open_id: "ou_123".to_string(),
            },
        )
    }

    #[test]
    fn test_dispatch_request_body() {
        assert_eq!(
            serde_json::to_value(hello_request()).unwrap(),
            json!({
                "event_type": "feishu_trigger",
                "client_payload": {"user_command": "hello", "user_id": "ou_123"}
            })
        );
    }

    #[test]
    fn test_dispatch_url_trims_trailing_slash() {
        let dispatcher = GithubDispatcher::new(&DispatchConfig {
            api_base: "https://api.github.com/".to_string(),
            ..DispatchConfig::default()
        })
        .unwrap();
        assert_eq!(
            dispatcher.dispatch_url("octo/lifeops"),
            "https://api.github.com/repos/octo/lifeops/dispatches"
        );
    }

    #[tokio::test]
    async fn test_forward_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/lifeops/dispatches"))
            .and(header("authorization", "token ghp_test"))
            .and(header("accept", GITHUB_ACCEPT))
            .and(body_json(json!({
                "event_type": "feishu_trigger",
                "client_payload": {"user_command": "hello", "user_id": "ou_123"}
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = GithubDispatcher::new(&config_for(&server)).unwrap();
        dispatcher.forward(&hello_request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_forward_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let dispatcher = GithubDispatcher::new(&config_for(&server)).unwrap();
        let err = dispatcher.forward(&hello_request()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Forwarding(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_forward_missing_repo() {
        let dispatcher = GithubDispatcher::new(&DispatchConfig {
            token: Some("ghp_test".to_string()),
            ..DispatchConfig::default()
        })
        .unwrap();
        let err = dispatcher.forward(&hello_request()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_forward_missing_token() {
        let dispatcher = GithubDispatcher::new(&DispatchConfig {
            repo: Some("octo/lifeops".to_string()),
            ..DispatchConfig::default()
        })
        .unwrap();
        let err = dispatcher.forward(&hello_request()).await.unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[tokio::test]
    async fn test_forward_unconfigured_is_counted() {
        let dispatcher = GithubDispatcher::new(&DispatchConfig::default()).unwrap();
        let before = metrics::DISPATCHES_TOTAL
            .with_label_values(&["unconfigured"])
            .get();
        let err = dispatcher.forward(&hello_request()).await.unwrap_err();
        assert!(err.to_string().contains("GITHUB_REPO"));
        let after = metrics::DISPATCHES_TOTAL
            .with_label_values(&["unconfigured"])
            .get();
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_forward_connection_refused() {
        // Nothing listens on port 9 (discard) on a test host
        let dispatcher = GithubDispatcher::new(&DispatchConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            repo: Some("octo/lifeops".to_string()),
            token: Some("ghp_test".to_string()),
            timeout_secs: 2,
            ..DispatchConfig::default()
        })
        .unwrap();
        let err = dispatcher.forward(&hello_request()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Forwarding(_)));
    }
}
