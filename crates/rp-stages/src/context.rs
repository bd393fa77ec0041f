//! Context stages: move values between the pipeline and the request context
use async_trait::async_trait;
use rp_core::{BoxError, Context, ContextError, SharedLogger, Stage, StageError};
use serde_json::Value;

/// Outputs the value stored under `key`. A missing key is a server error.
pub struct CtxGet {
    key: String,
}

pub fn ctx_get(key: impl Into<String>) -> CtxGet {
    CtxGet { key: key.into() }
}

#[async_trait]
impl Stage for CtxGet {
    fn display(&self) -> String {
        format!("[\"{}\"] =>", self.key)
    }

    async fn run(
        &self,
        _input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        Ok(ctx.must_get_value(&self.key)?)
    }

    fn on_error(&self, err: BoxError) -> StageError {
        match err.downcast::<ContextError>() {
            Ok(err) => StageError::internal(err),
            Err(_) => StageError::internal(format!("Key not found: {}", self.key)),
        }
    }
}

/// Stores its input under `key` and passes it on unchanged.
pub struct CtxSet {
    key: String,
}

pub fn ctx_set(key: impl Into<String>) -> CtxSet {
    CtxSet { key: key.into() }
}

#[async_trait]
impl Stage for CtxSet {
    fn display(&self) -> String {
        format!("  => [\"{}\"]", self.key)
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        ctx.set_value(self.key.clone(), input.clone());
        Ok(input)
    }
}
