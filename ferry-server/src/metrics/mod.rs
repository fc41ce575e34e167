//! Prometheus Metrics for Ferry
//!
//! - Client command counts and latency
//! - Follower-side replication progress
//! - Leader-side log streaming

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
};

lazy_static! {
    // ============================================================================
    // Command Metrics
    // ============================================================================

    /// Total client commands by name and status
    pub static ref COMMANDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ferry_commands_total",
        "Total number of client commands by name and status",
        &["command", "status"]
    ).unwrap();

    /// Command latency in seconds
    pub static ref COMMAND_DURATION: HistogramVec = register_histogram_vec!(
        "ferry_command_duration_seconds",
        "Client command latency in seconds",
        &["command"],
        vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0]
    ).unwrap();

    /// Open client connections
    pub static ref CONNECTIONS: IntGauge = register_int_gauge!(
        "ferry_connections",
        "Number of open client connections"
    ).unwrap();

    // ============================================================================
    // Replication Metrics
    // ============================================================================

    /// Records applied from a leader stream
    pub static ref REPL_RECORDS_APPLIED: IntCounterVec = register_int_counter_vec!(
        "ferry_replication_records_applied_total",
        "Replicated records applied, by durability",
        &["kind"]
    ).unwrap();

    /// Bytes received (follower) and sent (leader) on log streams
    pub static ref REPL_BYTES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ferry_replication_bytes_total",
        "Replication stream bytes",
        &["direction"]
    ).unwrap();

    /// Follow session attempts by how they ended
    pub static ref REPL_SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ferry_replication_session_attempts_total",
        "Follow session attempts by outcome",
        &["outcome"]
    ).unwrap();

    /// 1 while the current session is caught up
    pub static ref REPL_CAUGHT_UP: IntGauge = register_int_gauge!(
        "ferry_replication_caught_up",
        "Whether the current follow session is caught up"
    ).unwrap();

    /// Applied offset in leader log coordinates
    pub static ref REPL_APPLIED_OFFSET: IntGauge = register_int_gauge!(
        "ferry_replication_applied_offset_bytes",
        "Applied offset of the follow session in leader log bytes"
    ).unwrap();

    /// Current follow generation
    pub static ref REPL_GENERATION: IntGauge = register_int_gauge!(
        "ferry_replication_generation",
        "Current follow configuration generation"
    ).unwrap();

    /// Times this server caught up with a leader
    pub static ref REPL_CATCH_UPS: IntCounter = register_int_counter!(
        "ferry_replication_catch_ups_total",
        "Number of times a follow session caught up"
    ).unwrap();
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Initialize metrics with default values
pub fn init_metrics() {
    // Force registration so every series shows up before first use
    let _ = &*COMMANDS_TOTAL;
    let _ = &*COMMAND_DURATION;
    let _ = &*CONNECTIONS;
    let _ = &*REPL_RECORDS_APPLIED;
    let _ = &*REPL_BYTES_TOTAL;
    let _ = &*REPL_SESSIONS_TOTAL;
    let _ = &*REPL_CAUGHT_UP;
    let _ = &*REPL_APPLIED_OFFSET;
    let _ = &*REPL_GENERATION;
    let _ = &*REPL_CATCH_UPS;

    tracing::info!("Prometheus metrics initialized");
}

/// Record client command
pub fn record_command(command: &str, status: &str, duration_secs: f64) {
    COMMANDS_TOTAL.with_label_values(&[command, status]).inc();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration_secs);
}

/// Record one applied replicated record
pub fn record_applied(durable: bool, bytes: u64) {
    let kind = if durable { "durable" } else { "non_durable" };
    REPL_RECORDS_APPLIED.with_label_values(&[kind]).inc();
    REPL_BYTES_TOTAL.with_label_values(&["received"]).inc_by(bytes);
}

/// Record log bytes streamed to a follower
pub fn record_stream_bytes(bytes: u64) {
    REPL_BYTES_TOTAL.with_label_values(&["sent"]).inc_by(bytes);
}

/// Record how a follow session attempt ended
pub fn record_session_outcome(outcome: &str) {
    REPL_SESSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_caught_up(caught_up: bool) {
    if caught_up {
        REPL_CATCH_UPS.inc();
    }
    REPL_CAUGHT_UP.set(i64::from(caught_up));
}

pub fn set_applied_offset(offset: u64) {
    REPL_APPLIED_OFFSET.set(offset as i64);
}

pub fn set_generation(generation: u64) {
    REPL_GENERATION.set(generation as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_command() {
        record_command("set", "success", 0.001);
        record_command("get", "error", 0.002);

        let metrics = encode_metrics().unwrap();
        assert!(metrics.contains("ferry_commands_total"));
        assert!(metrics.contains("ferry_command_duration_seconds"));
    }

    #[test]
    fn test_replication_metrics() {
        record_applied(true, 30);
        record_applied(false, 40);
        record_session_outcome("topology");
        set_caught_up(true);

        let metrics = encode_metrics().unwrap();
        assert!(metrics.contains("ferry_replication_records_applied_total"));
        assert!(metrics.contains("ferry_replication_session_attempts_total"));
        assert!(metrics.contains("ferry_replication_caught_up"));
    }
}
