use prometheus::{
    Encoder, GaugeVec, CounterVec, Opts, Registry, TextEncoder,
    register_gauge_vec_with_registry, register_counter_vec_with_registry,
};
use lazy_static::lazy_static;
use std::sync::Arc;
use sysinfo::System;

use crate::models::{HealthAction, HealthCheckResult, StatusSnapshot};

pub struct MetricsRegistry {
    registry: Registry,
    hostname: String,

    // Gauge metrics
    pub bot_up: GaugeVec,
    pub bot_cpu_usage: GaugeVec,
    pub bot_memory_bytes: GaugeVec,
    pub bot_uptime_seconds: GaugeVec,
    pub bot_restarts_in_window: GaugeVec,
    pub bot_halted: GaugeVec,
    pub bot_last_check_timestamp: GaugeVec,

    // Counter metrics
    pub health_checks_total: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();
        let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());

        let common_labels = &["hostname"];

        let bot_up = register_gauge_vec_with_registry!(
            Opts::new("bot_up", "Trading engine is running (1) or down (0)"),
            common_labels,
            registry
        ).unwrap();

        let bot_cpu_usage = register_gauge_vec_with_registry!(
            Opts::new("bot_cpu_usage_percent", "Trading engine CPU usage percentage"),
            common_labels,
            registry
        ).unwrap();

        let bot_memory_bytes = register_gauge_vec_with_registry!(
            Opts::new("bot_memory_bytes", "Trading engine resident memory in bytes"),
            common_labels,
            registry
        ).unwrap();

        let bot_uptime_seconds = register_gauge_vec_with_registry!(
            Opts::new("bot_uptime_seconds", "Seconds since the engine was started"),
            common_labels,
            registry
        ).unwrap();

        let bot_restarts_in_window = register_gauge_vec_with_registry!(
            Opts::new("bot_restarts_in_window", "Automatic restarts inside the current restart window"),
            common_labels,
            registry
        ).unwrap();

        let bot_halted = register_gauge_vec_with_registry!(
            Opts::new("bot_halted", "Automatic recovery halted, manual start required (1)"),
            common_labels,
            registry
        ).unwrap();

        let bot_last_check_timestamp = register_gauge_vec_with_registry!(
            Opts::new("bot_last_health_check_timestamp_seconds", "Unix timestamp of the last health check"),
            common_labels,
            registry
        ).unwrap();

        let health_checks_total = register_counter_vec_with_registry!(
            Opts::new("bot_health_checks_total", "Health checks run by this process, by action"),
            &["hostname", "action"],
            registry
        ).unwrap();

        Self {
            registry,
            hostname,
            bot_up,
            bot_cpu_usage,
            bot_memory_bytes,
            bot_uptime_seconds,
            bot_restarts_in_window,
            bot_halted,
            bot_last_check_timestamp,
            health_checks_total,
        }
    }

    pub fn update_from_snapshot(&self, snapshot: &StatusSnapshot) {
        let labels = &[self.hostname.as_str()];

        self.bot_up
            .with_label_values(labels)
            .set(if snapshot.is_running { 1.0 } else { 0.0 });
        self.bot_cpu_usage
            .with_label_values(labels)
            .set(snapshot.cpu_usage as f64);
        self.bot_memory_bytes
            .with_label_values(labels)
            .set(snapshot.memory_usage * 1024.0 * 1024.0);
        self.bot_uptime_seconds
            .with_label_values(labels)
            .set(snapshot.uptime_secs as f64);
        self.bot_restarts_in_window
            .with_label_values(labels)
            .set(snapshot.restart_count as f64);
        self.bot_halted
            .with_label_values(labels)
            .set(if snapshot.halted { 1.0 } else { 0.0 });

        if let Some(check) = &snapshot.last_health_check {
            self.bot_last_check_timestamp
                .with_label_values(labels)
                .set(check.timestamp.timestamp() as f64);
        }
    }

    pub fn record_check(&self, result: &HealthCheckResult) {
        let action = match result.action {
            HealthAction::None => "none",
            HealthAction::Restarted => "restarted",
            HealthAction::Halted => "halted",
        };
        self.health_checks_total
            .with_label_values(&[self.hostname.as_str(), action])
            .inc();
    }

    pub fn render(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

lazy_static! {
    pub static ref METRICS: Arc<MetricsRegistry> = Arc::new(MetricsRegistry::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_render_contains_recorded_check() {
        let metrics = MetricsRegistry::new();
        metrics.record_check(&HealthCheckResult {
            timestamp: Utc::now(),
            alive: false,
            action: HealthAction::Restarted,
            pid: Some(42),
            detail: None,
        });
        let text = metrics.render().unwrap();
        assert!(text.contains("bot_health_checks_total"));
        assert!(text.contains("action=\"restarted\""));
    }
}
