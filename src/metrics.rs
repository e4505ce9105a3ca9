// Prometheus metrics for the bridge
//
// Exposed on the /metrics endpoint:
// - Callbacks received, by outcome
// - Dispatch attempts, by status
// - Dispatch latency (histogram)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounterVec, Registry, TextEncoder};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref CALLBACKS_RECEIVED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("callbacks_received_total", "Feishu callbacks received, by outcome"),
        &["outcome"]
    ).expect("Failed to create callbacks received metric");

    pub static ref DISPATCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("dispatches_total", "Repository dispatch attempts, by status"),
        &["status"]
    ).expect("Failed to create dispatches metric");

    pub static ref DISPATCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("dispatch_duration_seconds", "Repository dispatch call latency"),
    ).expect("Failed to create dispatch duration metric");
}

static INIT: Once = Once::new();

/// Register all metrics; repeated calls are no-ops
pub fn init() -> prometheus::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(CALLBACKS_RECEIVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DISPATCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DISPATCH_DURATION_SECONDS.clone()))?;
    Ok(())
}

/// Count one handled callback
pub fn record_callback(outcome: &str) {
    CALLBACKS_RECEIVED_TOTAL.with_label_values(&[outcome]).inc();
}

/// Count one dispatch attempt and its latency
pub fn record_dispatch(status: &str, elapsed_secs: f64) {
    DISPATCHES_TOTAL.with_label_values(&[status]).inc();
    DISPATCH_DURATION_SECONDS.observe(elapsed_secs);
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
