//! Prometheus metrics fed by pipeline logger hooks
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use rp_core::{Logger, StageError};
use serde_json::Value;
use std::time::Duration;

/// [`Logger`] that records stage outcomes and latencies.
#[derive(Clone)]
pub struct MetricsLogger {
    runs: IntCounter,
    stages: IntCounterVec,
    latency: HistogramVec,
    errors: IntCounterVec,
}

impl MetricsLogger {
    /// Creates the collectors and registers them with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let runs = IntCounter::new("rp_pipeline_runs_total", "Pipeline executions started")?;
        let stages = IntCounterVec::new(
            Opts::new("rp_stage_runs_total", "Stage executions by outcome"),
            &["stage", "outcome"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new("rp_stage_duration_seconds", "Stage execution time"),
            &["stage"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("rp_pipeline_errors_total", "Failed pipeline executions by status code"),
            &["code"],
        )?;

        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(stages.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            runs,
            stages,
            latency,
            errors,
        })
    }
}

impl Logger for MetricsLogger {
    fn start(&self, _message: &str) {
        self.runs.inc();
    }

    fn stage_complete(&self, success: bool, elapsed: Duration, label: &str, _output: Option<&Value>) {
        let outcome = if success { "ok" } else { "err" };
        self.stages.with_label_values(&[label, outcome]).inc();
        self.latency
            .with_label_values(&[label])
            .observe(elapsed.as_secs_f64());
    }

    fn stage_error(&self, error: &StageError) {
        self.errors
            .with_label_values(&[error.code.as_str()])
            .inc();
    }
}

/// Renders every metric in `registry` in the text exposition format.
pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}
