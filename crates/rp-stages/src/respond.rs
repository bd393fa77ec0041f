//! Response stage: turns the current value into the route's response
use async_trait::async_trait;
use rp_core::{BoxError, Context, Response, SharedLogger, Stage, StatusCode};
use serde_json::Value;

/// Wraps its input as the payload of a response with a fixed status code.
pub struct Respond {
    code: StatusCode,
}

pub fn respond(code: StatusCode) -> Respond {
    Respond { code }
}

#[async_trait]
impl Stage for Respond {
    fn display(&self) -> String {
        format!("  => Response({})", self.code.as_u16())
    }

    async fn run(
        &self,
        input: Value,
        _ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        Ok(Response::new(self.code, input).into_value())
    }
}
