//! Metrics collector for the sandbox fleet coordinator
//!
//! Wraps handles from the `metrics` crate. Without an installed recorder
//! every handle is a no-op, so components can always hold one.

use std::net::SocketAddr;

use anyhow::Result;
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::{debug, info};

/// Metrics collector for the sandbox fleet coordinator
pub struct FleetMetrics {
    // Dispatch metrics
    submissions_dispatched_total: Counter,
    submissions_queued_total: Counter,
    submissions_abandoned_total: Counter,
    forward_failures_total: Counter,
    dispatch_duration: Histogram,

    // Fleet metrics
    active_workers: Gauge,
    health_poll_failures_total: Counter,
    backlog_depth: Gauge,

    // Task tracking metrics
    task_status_changes_total: Counter,
    task_poll_failures_total: Counter,
}

impl FleetMetrics {
    pub fn new() -> Self {
        Self {
            submissions_dispatched_total: counter!("fleet_submissions_dispatched_total"),
            submissions_queued_total: counter!("fleet_submissions_queued_total"),
            submissions_abandoned_total: counter!("fleet_submissions_abandoned_total"),
            forward_failures_total: counter!("fleet_forward_failures_total"),
            dispatch_duration: histogram!("fleet_dispatch_duration_seconds"),
            active_workers: gauge!("fleet_active_workers"),
            health_poll_failures_total: counter!("fleet_health_poll_failures_total"),
            backlog_depth: gauge!("fleet_backlog_depth"),
            task_status_changes_total: counter!("fleet_task_status_changes_total"),
            task_poll_failures_total: counter!("fleet_task_poll_failures_total"),
        }
    }

    /// Record a submission accepted by a worker
    pub fn record_dispatched(&self, worker: &str, duration_seconds: f64) {
        self.submissions_dispatched_total.increment(1);
        self.dispatch_duration.record(duration_seconds);

        debug!(
            worker = worker,
            duration_seconds = duration_seconds,
            "Submission dispatched"
        );
    }

    pub fn record_queued(&self) {
        self.submissions_queued_total.increment(1);
    }

    pub fn record_abandoned(&self, count: u64) {
        self.submissions_abandoned_total.increment(count);
    }

    pub fn record_forward_failure(&self, worker: &str) {
        self.forward_failures_total.increment(1);
        debug!(worker = worker, "Forward failure recorded");
    }

    pub fn record_health_poll_failure(&self) {
        self.health_poll_failures_total.increment(1);
    }

    pub fn update_active_workers(&self, count: usize) {
        self.active_workers.set(count as f64);
    }

    pub fn update_backlog_depth(&self, depth: usize) {
        self.backlog_depth.set(depth as f64);
    }

    pub fn record_task_status_change(&self) {
        self.task_status_changes_total.increment(1);
    }

    pub fn record_task_poll_failure(&self) {
        self.task_poll_failures_total.increment(1);
    }
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 安装全局 Prometheus 记录器并在指定地址暴露指标，需在 tokio 运行时内调用
pub fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| anyhow::anyhow!("无效的指标监听地址 {bind_address}: {e}"))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    info!("Prometheus metrics exporter listening on {addr}");
    Ok(())
}
