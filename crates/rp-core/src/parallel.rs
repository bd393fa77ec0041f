//! Parallel stage: fans sub-chains out onto tasks and joins them in order
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::chain::Chain;
use crate::context::Context;
use crate::runner::execute;
use crate::stage::{BoxError, NestedError, SharedLogger, Stage, StageError};

/// Stage that runs every branch on its own tokio task.
///
/// All branches share the request [`Context`]. The stage waits for every
/// branch to finish, even after one of them failed; nothing is cancelled.
/// Its output is a JSON array whose element `i` is the output of branch `i`.
/// When several branches fail, the one with the lowest index wins.
pub struct InParallel {
    branches: Vec<Arc<Chain>>,
    log_branches: bool,
}

impl InParallel {
    pub fn new(branches: impl IntoIterator<Item = Chain>) -> Self {
        Self {
            branches: branches.into_iter().map(Arc::new).collect(),
            log_branches: false,
        }
    }

    /// Hands the enclosing logger to every branch. Off by default.
    pub fn log_branches(mut self, enabled: bool) -> Self {
        self.log_branches = enabled;
        self
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }
}

/// Shorthand for [`InParallel::new`].
pub fn in_parallel(branches: impl IntoIterator<Item = Chain>) -> InParallel {
    InParallel::new(branches)
}

#[async_trait]
impl Stage for InParallel {
    fn display(&self) -> String {
        "InParallel".to_string()
    }

    async fn run(
        &self,
        _input: Value,
        ctx: &Context,
        logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        let branch_logger = logger.filter(|_| self.log_branches).cloned();

        let handles: Vec<_> = self
            .branches
            .iter()
            .map(|chain| {
                let chain = Arc::clone(chain);
                let ctx = ctx.clone();
                let logger = branch_logger.clone();
                tokio::spawn(async move { execute(&chain, &ctx, logger.as_ref()).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap_or_else(|join_error| {
                tracing::error!(branch = index, error = %join_error, "parallel branch aborted");
                Err(StageError::internal(format!("branch {} aborted", index)))
            });
            results.push(result);
        }

        let mut outputs = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(out) => outputs.push(out),
                Err(error) => return Err(NestedError::Branch { index, error }.into()),
            }
        }

        Ok(Value::Array(outputs))
    }

    fn on_error(&self, err: BoxError) -> StageError {
        NestedError::unwrap_boxed(err, |other| StageError::internal(other))
    }
}
