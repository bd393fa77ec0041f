//! Closure stages
//!
//! The quickest way to write a one-off stage: a label plus a closure.
use async_trait::async_trait;
use rp_core::{BoxError, Context, SharedLogger, Stage, StageError};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

type ErrorMap = Box<dyn Fn(BoxError) -> StageError + Send + Sync>;
type SyncFn = Box<dyn Fn(Value, &Context) -> Result<Value, BoxError> + Send + Sync>;
type StageFuture = Pin<Box<dyn Future<Output = Result<Value, BoxError>> + Send>>;
type AsyncFn = Box<dyn Fn(Value, Context) -> StageFuture + Send + Sync>;

/// Stage backed by a synchronous closure.
pub struct Func {
    name: String,
    f: SyncFn,
    error_map: Option<ErrorMap>,
}

/// Creates a [`Func`] stage. Errors translate to 400 with the error text.
pub fn func(
    name: impl Into<String>,
    f: impl Fn(Value, &Context) -> Result<Value, BoxError> + Send + Sync + 'static,
) -> Func {
    Func {
        name: name.into(),
        f: Box::new(f),
        error_map: None,
    }
}

impl Func {
    /// Replaces the default error translation.
    pub fn on_error(mut self, f: impl Fn(BoxError) -> StageError + Send + Sync + 'static) -> Self {
        self.error_map = Some(Box::new(f));
        self
    }
}

#[async_trait]
impl Stage for Func {
    fn display(&self) -> String {
        self.name.clone()
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        (self.f)(input, ctx)
    }

    fn on_error(&self, err: BoxError) -> StageError {
        match &self.error_map {
            Some(map) => map(err),
            None => StageError::bad_request(err),
        }
    }
}

/// Stage backed by an async closure. The closure gets its own [`Context`]
/// handle so the returned future can be `'static`.
pub struct AsyncFunc {
    name: String,
    f: AsyncFn,
    error_map: Option<ErrorMap>,
}

/// Creates an [`AsyncFunc`] stage. Errors translate to 400 with the error text.
pub fn func_async<F, Fut>(name: impl Into<String>, f: F) -> AsyncFunc
where
    F: Fn(Value, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
    AsyncFunc {
        name: name.into(),
        f: Box::new(move |input, ctx| Box::pin(f(input, ctx)) as StageFuture),
        error_map: None,
    }
}

impl AsyncFunc {
    pub fn on_error(mut self, f: impl Fn(BoxError) -> StageError + Send + Sync + 'static) -> Self {
        self.error_map = Some(Box::new(f));
        self
    }
}

#[async_trait]
impl Stage for AsyncFunc {
    fn display(&self) -> String {
        self.name.clone()
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        (self.f)(input, ctx.clone()).await
    }

    fn on_error(&self, err: BoxError) -> StageError {
        match &self.error_map {
            Some(map) => map(err),
            None => StageError::bad_request(err),
        }
    }
}
