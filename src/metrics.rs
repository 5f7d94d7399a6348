//! Prometheus metrics for the bot pipeline
//!
//! Exposed by the debug server on `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};

lazy_static! {
    /// Counter: frames read from the relay
    pub static ref FRAMES_RECEIVED: Counter = register_counter!(
        "haikubot_frames_received_total",
        "Frames read from the relay stream"
    )
    .expect("Failed to create frames_received metric");

    /// Counter: candidates accepted by the filter
    pub static ref CANDIDATES: Counter = register_counter!(
        "haikubot_candidates_total",
        "Posts accepted by the event filter"
    )
    .expect("Failed to create candidates metric");

    /// Counter: filter rejections by reason
    pub static ref REJECTIONS: CounterVec = register_counter_vec!(
        "haikubot_rejections_total",
        "Operations rejected by the event filter",
        &["reason"]
    )
    .expect("Failed to create rejections metric");

    /// Counter: predicate matches by pattern
    pub static ref MATCHES: CounterVec = register_counter_vec!(
        "haikubot_matches_total",
        "Candidates matching a target pattern",
        &["pattern"]
    )
    .expect("Failed to create matches metric");

    /// Counter: post outcomes
    pub static ref POSTS: CounterVec = register_counter_vec!(
        "haikubot_posts_total",
        "Reply posts by outcome",
        &["status"]
    )
    .expect("Failed to create posts metric");

    /// Counter: pipeline restarts by cause
    pub static ref RESTARTS: CounterVec = register_counter_vec!(
        "haikubot_pipeline_restarts_total",
        "Pipeline runs ended and restarted",
        &["cause"]
    )
    .expect("Failed to create restarts metric");

    /// Counter: watchdog closes after a silent stream
    pub static ref WATCHDOG_TIMEOUTS: Counter = register_counter!(
        "haikubot_watchdog_timeouts_total",
        "Connections closed by the idle watchdog"
    )
    .expect("Failed to create watchdog_timeouts metric");

    /// Counter: failed heartbeat pings
    pub static ref HEARTBEAT_FAILURES: Counter = register_counter!(
        "haikubot_heartbeat_failures_total",
        "Heartbeat pings that failed"
    )
    .expect("Failed to create heartbeat_failures metric");

    /// Gauge: event queue depth
    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "haikubot_queue_depth",
        "Events waiting in the bounded queue"
    )
    .expect("Failed to create queue_depth metric");

    /// Gauge: 1 while a pipeline run is streaming
    pub static ref HEALTH_STATUS: Gauge = register_gauge!(
        "haikubot_health_status",
        "Pipeline health (1 = streaming, 0 = not connected)"
    )
    .expect("Failed to create health_status metric");
}

pub fn record_frame() {
    FRAMES_RECEIVED.inc();
}

pub fn record_candidate() {
    CANDIDATES.inc();
}

pub fn record_rejection(reason: &str) {
    REJECTIONS.with_label_values(&[reason]).inc();
}

pub fn record_match(pattern: &str) {
    MATCHES.with_label_values(&[pattern]).inc();
}

/// Record a post outcome ("posted", "skipped", "failed")
pub fn record_post(status: &str) {
    POSTS.with_label_values(&[status]).inc();
}

pub fn record_restart(cause: &str) {
    RESTARTS.with_label_values(&[cause]).inc();
}

pub fn record_watchdog_timeout() {
    WATCHDOG_TIMEOUTS.inc();
}

pub fn record_heartbeat_failure() {
    HEARTBEAT_FAILURES.inc();
}

pub fn set_queue_depth(depth: i64) {
    QUEUE_DEPTH.set(depth as f64);
}

pub fn set_health_status(healthy: bool) {
    HEALTH_STATUS.set(if healthy { 1.0 } else { 0.0 });
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::HaikuBotError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::HaikuBotError::Other(format!("Metrics are not UTF-8: {}", e)))
}
