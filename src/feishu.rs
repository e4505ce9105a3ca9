// Feishu open platform client
//
// Used by the `notify` command so downstream workflows can reply to the user
// who sent a command. Exchanges app credentials for a tenant access token,
// then posts a text or card message to an open_id.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::FeishuConfig;
use crate::error::{BridgeError, Result};

/// Message to deliver to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plain text message
    Text(String),
    /// Interactive card with a coloured header and a markdown body
    Card {
        title: String,
        theme: String,
        markdown: String,
    },
}

impl MessageBody {
    /// Feishu `msg_type` for this body
    pub fn msg_type(&self) -> &'static str {
        match self {
            MessageBody::Text(_) => "text",
            MessageBody::Card { .. } => "interactive",
        }
    }

    /// JSON-encoded `content` string expected by the messages API
    pub fn content(&self) -> String {
        match self {
            MessageBody::Text(text) => json!({ "text": text }).to_string(),
            MessageBody::Card {
                title,
                theme,
                markdown,
            } => json!({
                "header": {
                    "title": {"tag": "plain_text", "content": title},
                    "template": theme
                },
                "elements": [
                    {"tag": "div", "text": {"tag": "lark_md", "content": markdown}}
                ]
            })
            .to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// Client for the Feishu open platform
pub struct FeishuClient {
    client: reqwest::Client,
    api_base: String,
    app_id: String,
    app_secret: String,
}

impl FeishuClient {
    /// Create a client; app id and secret are required
    pub fn new(config: &FeishuConfig) -> Result<Self> {
        let app_id = config
            .app_id
            .clone()
            .ok_or_else(|| BridgeError::Configuration("FEISHU_APP_ID is not set".to_string()))?;
        let app_secret = config.app_secret.clone().ok_or_else(|| {
            BridgeError::Configuration("FEISHU_APP_SECRET is not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BridgeError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            app_id,
            app_secret,
        })
    }

    /// Obtain a tenant access token for the app
    pub async fn tenant_access_token(&self) -> Result<String> {
        let url = format!(
            "{}/open-apis/auth/v3/tenant_access_token/internal",
            self.api_base
        );

        let response: TokenResponse = self
            .client
            .post(&url)
            .json(&json!({"app_id": self.app_id, "app_secret": self.app_secret}))
            .send()
            .await
            .map_err(|e| BridgeError::Feishu(format!("token request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| BridgeError::Feishu(format!("token response unreadable: {}", e)))?;

        if response.code != 0 {
            return Err(BridgeError::Feishu(format!(
                "token request rejected ({}): {}",
                response.code, response.msg
            )));
        }

        debug!("Obtained tenant access token");
        response
            .tenant_access_token
            .ok_or_else(|| BridgeError::Feishu("token missing from response".to_string()))
    }

    /// Send a message to a user identified by open_id
    ///
    /// Returns the `message_id` assigned by Feishu, when present.
    pub async fn send_message(&self, open_id: &str, body: &MessageBody) -> Result<Option<String>> {
        let token = self.tenant_access_token().await?;
        let url = format!(
            "{}/open-apis/im/v1/messages?receive_id_type=open_id",
            self.api_base
        );

        let http_response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "receive_id": open_id,
                "msg_type": body.msg_type(),
                "content": body.content(),
            }))
            .send()
            .await
            .map_err(|e| BridgeError::Feishu(format!("send request failed: {}", e)))?;

        let status = http_response.status();
        let response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| BridgeError::Feishu(format!("HTTP {}: unreadable response: {}", status, e)))?;

        if response.code != 0 {
            return Err(BridgeError::Feishu(format!(
                "send rejected ({}): {}",
                response.code, response.msg
            )));
        }

        let message_id = response
            .data
            .get("message_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        info!(open_id = %open_id, msg_type = body.msg_type(), "Message sent");
        Ok(message_id)
    }
}
