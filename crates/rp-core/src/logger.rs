//! Logger contract: observer hooks around stage execution
use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::stage::{SharedLogger, StageError};

/// Diagnostics observer. Hooks never influence control flow.
///
/// Every hook has an empty default, so implementors only override what they
/// care about.
pub trait Logger: Send + Sync {
    /// A pipeline run is starting.
    fn start(&self, _message: &str) {}

    /// `label` is about to run with `input`.
    fn stage_start(&self, _label: &str, _input: &Value) {}

    /// `label` finished. `output` is `None` when the stage failed.
    fn stage_complete(&self, _success: bool, _elapsed: Duration, _label: &str, _output: Option<&Value>) {}

    /// The run ended with `error`.
    fn stage_error(&self, _error: &StageError) {}
}

/// Console logger: one two-column colored line per stage.
///
/// ```text
/// |  OK  |      1.204ms | Req.Body =>
/// |  OK  |        9.1µs |   => ["body"]
/// | ERR  |       12.3µs | ["missing"] =>
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLogger;

impl DefaultLogger {
    pub fn shared() -> SharedLogger {
        Arc::new(Self)
    }

    /// Renders the status and elapsed-time columns followed by the label.
    pub fn render(success: bool, elapsed: Duration, label: &str) -> String {
        let status = if success {
            "  OK  ".white().on_green()
        } else {
            " ERR  ".white().on_red()
        };

        let time = format!("{:>13}", format!("{:?}", elapsed));
        let time = if elapsed > Duration::from_millis(1) {
            time.white().on_cyan()
        } else {
            time.white().dimmed()
        };

        format!("|{}| {} | {}", status, time, label)
    }
}

impl Logger for DefaultLogger {
    fn start(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn stage_complete(&self, success: bool, elapsed: Duration, label: &str, _output: Option<&Value>) {
        tracing::info!("{}", Self::render(success, elapsed, label));
    }

    fn stage_error(&self, error: &StageError) {
        match error.message() {
            Some(message) => tracing::warn!(code = error.code.as_u16(), "Error: {}", message),
            None => tracing::warn!(code = error.code.as_u16(), "Error: {}", error.payload),
        }
    }
}

/// Forwards every hook to each inner logger, in order.
#[derive(Clone, Default)]
pub struct MultiLogger {
    loggers: Vec<SharedLogger>,
}

impl MultiLogger {
    pub fn new(loggers: Vec<SharedLogger>) -> Self {
        Self { loggers }
    }

    pub fn with(mut self, logger: SharedLogger) -> Self {
        self.loggers.push(logger);
        self
    }
}

impl Logger for MultiLogger {
    fn start(&self, message: &str) {
        self.loggers.iter().for_each(|l| l.start(message));
    }

    fn stage_start(&self, label: &str, input: &Value) {
        self.loggers.iter().for_each(|l| l.stage_start(label, input));
    }

    fn stage_complete(&self, success: bool, elapsed: Duration, label: &str, output: Option<&Value>) {
        self.loggers
            .iter()
            .for_each(|l| l.stage_complete(success, elapsed, label, output));
    }

    fn stage_error(&self, error: &StageError) {
        self.loggers.iter().for_each(|l| l.stage_error(error));
    }
}

/// Test helper that records every hook call as a line of text.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    events: std::sync::Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn push(&self, event: String) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Logger for RecordingLogger {
    fn start(&self, message: &str) {
        self.push(format!("start {}", message));
    }

    fn stage_start(&self, label: &str, input: &Value) {
        self.push(format!("run {} {}", label, input));
    }

    fn stage_complete(&self, success: bool, _elapsed: Duration, label: &str, output: Option<&Value>) {
        let status = if success { "ok" } else { "err" };
        match output {
            Some(output) => self.push(format!("{} {} {}", status, label, output)),
            None => self.push(format!("{} {}", status, label)),
        }
    }

    fn stage_error(&self, error: &StageError) {
        self.push(format!("error {}", error.code.as_u16()));
    }
}
