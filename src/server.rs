// HTTP server for Feishu event callbacks
//
// Routes:
// - POST <webhook_path>  Feishu event subscription callback (default /webhook/event)
// - GET  /health         liveness probe
// - GET  /metrics        Prometheus scrape endpoint

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::event::CallbackResponse;
use crate::handler::WebhookHandler;
use crate::metrics;

/// Build the application router around a handler
pub fn router(handler: Arc<WebhookHandler>, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(event_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

/// Start the bridge HTTP server and run until Ctrl-C
pub async fn serve(config: &BridgeConfig) -> Result<()> {
    metrics::init().context("Failed to initialize metrics")?;

    let handler = WebhookHandler::from_config(config).context("Failed to build webhook handler")?;
    if config.feishu.encrypt_key.is_none() {
        warn!("FEISHU_ENCRYPT_KEY is not set; encrypted callbacks will be rejected");
    }
    if config.dispatch.repo.is_none() || config.dispatch.token.is_none() {
        warn!("GITHUB_REPO or GITHUB_TOKEN is not set; messages will not be forwarded");
    }

    let app = router(Arc::new(handler), &config.server.webhook_path);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.bind, config.server.port
            )
        })?;

    info!(
        "Listening for Feishu callbacks on {}{}",
        addr, config.server.webhook_path
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind bridge server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Bridge server error")?;

    info!("Bridge server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Feishu callback endpoint; always answers 200
async fn event_handler(
    State(handler): State<Arc<WebhookHandler>>,
    body: Bytes,
) -> Json<CallbackResponse> {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Callback body is not JSON: {}", e);
            metrics::record_callback("malformed");
            return Json(CallbackResponse::ok());
        }
    };

    Json(handler.handle(value).await)
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchRequest, Forwarder};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    struct NullForwarder;

    #[async_trait]
    impl Forwarder for NullForwarder {
        async fn forward(&self, _request: &DispatchRequest) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn app() -> Router {
        let handler = WebhookHandler::new(None, "feishu_trigger", Arc::new(NullForwarder));
        router(Arc::new(handler), "/webhook/event")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::init().unwrap();
        let response = app()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_challenge_over_http() {
        let request = Request::post("/webhook/event")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"challenge":"abc","type":"url_verification"}"#))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"challenge": "abc"}));
    }

    #[tokio::test]
    async fn test_non_json_body_is_acknowledged() {
        let request = Request::post("/webhook/event")
            .body(Body::from("this is not json"))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"msg": "ok"}));
    }

    #[tokio::test]
    async fn test_configuration_error_is_http_200() {
        let request = Request::post("/webhook/event")
            .body(Body::from(r#"{"encrypt":"AAAA"}"#))
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"msg": "Configuration Error"}));
    }
}
