//! Pipeline Runner: walks a chain, threading each output into the next stage
use serde_json::Value;
use std::time::Instant;

use crate::chain::Chain;
use crate::context::Context;
use crate::stage::{SharedLogger, StageError};

/// Message passed to [`crate::Logger::start`] at the beginning of every run.
pub const START_MESSAGE: &str = "Starting pipeline...";

/// Executes `chain` from its first stage with a null input.
///
/// Returns the last stage's output, or the translated error of the first
/// stage that failed. Stages after a failure never run and nothing already
/// done is rolled back.
pub async fn execute(
    chain: &Chain,
    ctx: &Context,
    logger: Option<&SharedLogger>,
) -> Result<Value, StageError> {
    execute_with(chain, Value::Null, ctx, logger).await
}

/// Like [`execute`], but feeds `input` to the first stage.
pub async fn execute_with(
    chain: &Chain,
    input: Value,
    ctx: &Context,
    logger: Option<&SharedLogger>,
) -> Result<Value, StageError> {
    if let Some(logger) = logger {
        logger.start(START_MESSAGE);
    }

    let mut current = input;

    for link in chain.links() {
        let label = link.display();
        if let Some(logger) = logger {
            logger.stage_start(&label, &current);
        }

        let start = Instant::now();
        let result = link.stage().run(current, ctx, logger).await;
        let elapsed = start.elapsed();

        match result {
            Ok(out) => {
                if let Some(logger) = logger {
                    logger.stage_complete(true, elapsed, &label, Some(&out));
                }
                current = out;
            }
            Err(err) => {
                let error = link.on_error(err);
                tracing::debug!(stage = %label, code = error.code.as_u16(), "stage failed");
                if let Some(logger) = logger {
                    logger.stage_complete(false, elapsed, &label, None);
                    logger.stage_error(&error);
                }
                return Err(error);
            }
        }
    }

    Ok(current)
}
