//! Error prefixing decorator
use async_trait::async_trait;
use rp_core::{BoxError, Context, SharedLogger, Stage, StageError};
use serde_json::Value;

/// Runs `inner` unchanged, but prefixes its error message with `prefix: `.
///
/// Only payloads of the conventional `{"error": "..."}` shape are rewritten.
pub struct CatchPrefix<S> {
    prefix: String,
    inner: S,
}

impl<S: Stage> CatchPrefix<S> {
    pub fn new(prefix: impl Into<String>, inner: S) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }
}

#[async_trait]
impl<S: Stage> Stage for CatchPrefix<S> {
    fn display(&self) -> String {
        self.inner.display()
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        self.inner.run(input, ctx, logger).await
    }

    fn on_error(&self, err: BoxError) -> StageError {
        let mut error = self.inner.on_error(err);
        if self.prefix.is_empty() {
            return error;
        }
        if let Some(Value::String(message)) = error.payload.get_mut("error") {
            *message = format!("{}: {}", self.prefix, message);
        }
        error
    }
}

/// Builder-style access to stage decorators.
pub trait StageExt: Stage + Sized {
    fn catch_prefix(self, prefix: impl Into<String>) -> CatchPrefix<Self> {
        CatchPrefix::new(prefix, self)
    }
}

impl<S: Stage> StageExt for S {}
