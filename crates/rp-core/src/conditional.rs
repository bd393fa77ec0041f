//! Conditional stage: runs one of two sub-chains depending on a predicate
use async_trait::async_trait;
use serde_json::Value;

use crate::chain::Chain;
use crate::context::Context;
use crate::runner::execute;
use crate::stage::{BoxError, NestedError, SharedLogger, Stage, StageError};

type Predicate = Box<dyn Fn(&Value, &Context) -> bool + Send + Sync>;

/// Stage that selects `then` or `otherwise` per request.
///
/// A missing branch is a no-op producing `null`. The selected chain runs
/// with the same context and logger as the enclosing execution, starting from
/// a null input like any top-level run. Its failure surfaces unchanged, as if
/// it had happened at this position of the outer chain.
pub struct IfElse {
    predicate: Predicate,
    then: Option<Chain>,
    otherwise: Option<Chain>,
}

impl IfElse {
    pub fn new(
        predicate: impl Fn(&Value, &Context) -> bool + Send + Sync + 'static,
        then: Option<Chain>,
        otherwise: Option<Chain>,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            then,
            otherwise,
        }
    }

    fn select(&self, input: &Value, ctx: &Context) -> Option<&Chain> {
        if (self.predicate)(input, ctx) {
            self.then.as_ref()
        } else {
            self.otherwise.as_ref()
        }
    }
}

/// Shorthand for [`IfElse::new`].
pub fn if_else(
    predicate: impl Fn(&Value, &Context) -> bool + Send + Sync + 'static,
    then: Option<Chain>,
    otherwise: Option<Chain>,
) -> IfElse {
    IfElse::new(predicate, then, otherwise)
}

#[async_trait]
impl Stage for IfElse {
    fn display(&self) -> String {
        if self.then.is_some() && self.otherwise.is_none() {
            "If => then".to_string()
        } else {
            "If => then/else".to_string()
        }
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        let Some(chain) = self.select(&input, ctx) else {
            return Ok(Value::Null);
        };

        execute(chain, ctx, logger)
            .await
            .map_err(|e| NestedError::Chain(e).into())
    }

    fn on_error(&self, err: BoxError) -> StageError {
        NestedError::unwrap_boxed(err, |other| StageError::internal(other))
    }
}
