//! Stage Trait: the single contract every pipeline step implements
use async_trait::async_trait;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::logger::Logger;

/// Error type returned by [`Stage::run`]. Anything `Send + Sync` converts into it with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Logger handle shared between a route, its stages and any parallel branches.
pub type SharedLogger = Arc<dyn Logger>;

/// Atomic unit of work in a pipeline.
///
/// A stage is built once, when the pipeline is defined, and reused by every
/// request that hits the route. Request-scoped state must go through the
/// [`Context`] argument; the stage itself stays immutable.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Human-readable label used by loggers.
    fn display(&self) -> String;

    /// Runs the stage on the previous stage's output.
    ///
    /// `logger` is the logger of the enclosing execution, if any. Only
    /// stages that execute nested chains need it.
    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError>;

    /// Translates an error returned by [`Stage::run`] into the terminal
    /// [`StageError`] of the execution.
    fn on_error(&self, err: BoxError) -> StageError {
        StageError::bad_request(err.to_string())
    }
}

/// Terminal failure of a pipeline run: a status code plus a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {payload}")]
pub struct StageError {
    #[serde(with = "status_code")]
    pub code: StatusCode,
    pub payload: Value,
}

impl StageError {
    pub fn new(code: StatusCode, payload: Value) -> Self {
        Self { code, payload }
    }

    /// `{"error": message}` payload with the given code.
    pub fn with_message(code: StatusCode, message: impl fmt::Display) -> Self {
        Self::new(code, json!({ "error": message.to_string() }))
    }

    pub fn bad_request(message: impl fmt::Display) -> Self {
        Self::with_message(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl fmt::Display) -> Self {
        Self::with_message(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl fmt::Display) -> Self {
        Self::with_message(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// The `error` field of the payload, when the payload has the conventional shape.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }
}

/// Error produced by a stage that executed a nested chain.
///
/// It carries the nested [`StageError`] so the wrapping stage's
/// [`Stage::on_error`] can hand it back unchanged.
#[derive(Debug, thiserror::Error)]
pub enum NestedError {
    #[error("chain execution error")]
    Chain(StageError),

    #[error("parallel error in branch {index}")]
    Branch { index: usize, error: StageError },
}

impl NestedError {
    pub fn into_stage_error(self) -> StageError {
        match self {
            Self::Chain(error) | Self::Branch { error, .. } => error,
        }
    }

    /// Unwraps a boxed [`NestedError`]; any other error falls back to `fallback`.
    pub fn unwrap_boxed(err: BoxError, fallback: impl FnOnce(BoxError) -> StageError) -> StageError {
        match err.downcast::<NestedError>() {
            Ok(nested) => nested.into_stage_error(),
            Err(other) => fallback(other),
        }
    }
}

/// Serializes [`StatusCode`] as its numeric value.
pub(crate) mod status_code {
    use http::StatusCode;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(code: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(code.as_u16())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StatusCode, D::Error> {
        let raw = u16::deserialize(deserializer)?;
        StatusCode::from_u16(raw).map_err(D::Error::custom)
    }
}
