use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use crate::classify::{MetricKind, Status};

/// Metrics registry for the service, scraped by Prometheus.
#[derive(Clone)]
pub struct AppMetrics {
    registry: Arc<Registry>,
    loops: LoopMetrics,
    fetch: FetchMetrics,
    readings: ReadingMetrics,
    alerts: AlertMetrics,
}

impl AppMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new_custom(Some("envmon".into()), None)?);

        let loops = LoopMetrics::register(&registry)?;
        let fetch = FetchMetrics::register(&registry)?;
        let readings = ReadingMetrics::register(&registry)?;
        let alerts = AlertMetrics::register(&registry)?;

        Ok(Self {
            registry,
            loops,
            fetch,
            readings,
            alerts,
        })
    }

    /// Observe the execution duration for a refresh loop.
    pub fn observe_duration(&self, loop_name: &str, duration: Duration) {
        self.loops
            .cycle_duration
            .with_label_values(&[loop_name])
            .observe(duration.as_secs_f64());
    }

    /// Record a success flag for a loop iteration (1=success, 0=failed).
    pub fn record_success(&self, loop_name: &str, success: bool) {
        self.loops
            .last_success
            .with_label_values(&[loop_name])
            .set(if success { 1 } else { 0 });
    }

    /// Increment the error counter for a loop.
    pub fn inc_error(&self, loop_name: &str) {
        self.loops
            .errors_total
            .with_label_values(&[loop_name])
            .inc();
    }

    /// Count a skipped cycle (a tick or manual trigger arrived while the
    /// same kind was still in flight).
    pub fn inc_skipped(&self, loop_name: &str) {
        self.loops
            .skipped_total
            .with_label_values(&[loop_name])
            .inc();
    }

    /// Count a failed or rejected fetch for one location.
    pub fn inc_fetch_failure(&self, location: &str) {
        self.fetch
            .failures_total
            .with_label_values(&[location])
            .inc();
    }

    /// Publish the latest value of one metric at one location.
    pub fn set_reading(&self, location: &str, metric: MetricKind, value: f64) {
        self.readings
            .value
            .with_label_values(&[location, metric.as_str()])
            .set(value);
    }

    /// Publish a location's composite status as a numeric severity level.
    pub fn set_composite(&self, location: &str, status: Status) {
        self.readings
            .composite
            .with_label_values(&[location])
            .set(status as i64);
    }

    /// Count an emitted alert.
    pub fn inc_alert(&self, metric: MetricKind, severity: Status) {
        self.alerts
            .emitted_total
            .with_label_values(&[metric.as_str(), severity.as_str()])
            .inc();
    }

    /// Publish the size of the current alert set.
    pub fn set_active_alerts(&self, count: usize) {
        self.alerts.active.set(count as i64);
    }

    /// Encode the registry in Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Clone)]
struct LoopMetrics {
    cycle_duration: HistogramVec,
    last_success: IntGaugeVec,
    errors_total: IntCounterVec,
    skipped_total: IntCounterVec,
}

impl LoopMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let cycle_duration = HistogramVec::new(
            HistogramOpts::new("cycle_duration_seconds", "Refresh cycle execution time")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0]),
            &["loop"],
        )?;
        let last_success = IntGaugeVec::new(
            Opts::new("loop_last_success", "Whether the last cycle succeeded"),
            &["loop"],
        )?;
        let errors_total = IntCounterVec::new(
            Opts::new("loop_errors_total", "Failed refresh cycles"),
            &["loop"],
        )?;
        let skipped_total = IntCounterVec::new(
            Opts::new(
                "loop_skipped_total",
                "Cycles skipped because the previous one was still running",
            ),
            &["loop"],
        )?;

        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(last_success.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(skipped_total.clone()))?;

        Ok(Self {
            cycle_duration,
            last_success,
            errors_total,
            skipped_total,
        })
    }
}

#[derive(Clone)]
struct FetchMetrics {
    failures_total: IntCounterVec,
}

impl FetchMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let failures_total = IntCounterVec::new(
            Opts::new(
                "fetch_failures_total",
                "Failed or rejected reading fetches per location",
            ),
            &["location"],
        )?;
        registry.register(Box::new(failures_total.clone()))?;
        Ok(Self { failures_total })
    }
}

#[derive(Clone)]
struct ReadingMetrics {
    value: GaugeVec,
    composite: IntGaugeVec,
}

impl ReadingMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let value = GaugeVec::new(
            Opts::new("reading_value", "Latest reading per location and metric"),
            &["location", "metric"],
        )?;
        let composite = IntGaugeVec::new(
            Opts::new(
                "location_status",
                "Composite location status (0=ok 1=info 2=warning 3=danger)",
            ),
            &["location"],
        )?;
        registry.register(Box::new(value.clone()))?;
        registry.register(Box::new(composite.clone()))?;
        Ok(Self { value, composite })
    }
}

#[derive(Clone)]
struct AlertMetrics {
    emitted_total: IntCounterVec,
    active: IntGauge,
}

impl AlertMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let emitted_total = IntCounterVec::new(
            Opts::new("alerts_emitted_total", "Alert events by metric and severity"),
            &["metric", "severity"],
        )?;
        let active = IntGauge::new("alerts_active", "Alerts in the current snapshot")?;
        registry.register(Box::new(emitted_total.clone()))?;
        registry.register(Box::new(active.clone()))?;
        Ok(Self {
            emitted_total,
            active,
        })
    }
}
