//! Request stages: read the inbound request out of the context
//!
//! The HTTP adapter stores the raw request under the `request.*` keys
//! before running a pipeline; these stages are the only readers.
use async_trait::async_trait;
use rp_core::{BoxError, Context, SharedLogger, Stage, StageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Raw body bytes (`Vec<u8>`).
pub const REQUEST_BODY: &str = "request.body";
/// Path parameters (`HashMap<String, String>`).
pub const REQUEST_PARAMS: &str = "request.params";
/// Query parameters (`HashMap<String, String>`).
pub const REQUEST_QUERY: &str = "request.query";

/// The parts of an inbound request that stages may read.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub body: Vec<u8>,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl RequestData {
    /// Stores each part under its `request.*` key.
    pub fn install(self, ctx: &Context) {
        ctx.set(REQUEST_BODY, self.body);
        ctx.set(REQUEST_PARAMS, self.params);
        ctx.set(REQUEST_QUERY, self.query);
    }
}

/// Parses the JSON body into `T` and outputs it as a pipeline value.
///
/// Fields unknown to `T` are dropped and defaults filled in, so the output
/// always has `T`'s shape.
pub struct Bind<T> {
    _target: PhantomData<fn() -> T>,
}

pub fn bind<T>() -> Bind<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    Bind {
        _target: PhantomData,
    }
}

#[async_trait]
impl<T> Stage for Bind<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    fn display(&self) -> String {
        "Req.Body =>".to_string()
    }

    async fn run(
        &self,
        _input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        let body = ctx.get::<Vec<u8>>(REQUEST_BODY).unwrap_or_default();
        let target: T = serde_json::from_slice(&body)?;
        Ok(serde_json::to_value(target)?)
    }

    fn on_error(&self, err: BoxError) -> StageError {
        StageError::bad_request(format!("Invalid request: {}", err))
    }
}

/// Outputs the path parameter `key`, or an empty string when absent.
pub struct UrlParam {
    key: String,
}

pub fn url_param(key: impl Into<String>) -> UrlParam {
    UrlParam { key: key.into() }
}

#[async_trait]
impl Stage for UrlParam {
    fn display(&self) -> String {
        format!("Req.URL(\"{}\") =>", self.key)
    }

    async fn run(
        &self,
        _input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        Ok(Value::String(lookup(ctx, REQUEST_PARAMS, &self.key)))
    }
}

/// Outputs the query parameter `key`, or an empty string when absent.
pub struct QueryParam {
    key: String,
}

pub fn query_param(key: impl Into<String>) -> QueryParam {
    QueryParam { key: key.into() }
}

#[async_trait]
impl Stage for QueryParam {
    fn display(&self) -> String {
        format!("Req.Query(\"{}\") =>", self.key)
    }

    async fn run(
        &self,
        _input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        Ok(Value::String(lookup(ctx, REQUEST_QUERY, &self.key)))
    }
}

fn lookup(ctx: &Context, map_key: &str, key: &str) -> String {
    ctx.get::<HashMap<String, String>>(map_key)
        .and_then(|map| map.get(key).cloned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rp_core::{chain, execute, StatusCode};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Purchase {
        customer_id: String,
        sku: String,
        #[serde(default = "one")]
        quantity: u32,
    }

    fn one() -> u32 {
        1
    }

    fn request(body: &str) -> Context {
        let ctx = Context::new();
        RequestData {
            body: body.as_bytes().to_vec(),
            params: HashMap::from([("id".to_string(), "c-1".to_string())]),
            query: HashMap::from([("page".to_string(), "2".to_string())]),
        }
        .install(&ctx);
        ctx
    }

    #[tokio::test]
    async fn test_bind_normalizes_body() {
        let ctx = request(r#"{"customer_id":"C1","sku":"A1","extra":true}"#);
        let out = execute(&chain![bind::<Purchase>()], &ctx, None).await.unwrap();
        assert_eq!(out, json!({ "customer_id": "C1", "sku": "A1", "quantity": 1 }));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_body() {
        let ctx = request(r#"{"sku":"A1"}"#);
        let err = execute(&chain![bind::<Purchase>()], &ctx, None).await.unwrap_err();
        assert_eq!(err.code, StatusCode::BAD_REQUEST);
        assert!(err.message().unwrap().starts_with("Invalid request: missing field"));
    }

    #[tokio::test]
    async fn test_bind_without_body() {
        let err = execute(&chain![bind::<Purchase>()], &Context::new(), None)
            .await
            .unwrap_err();
        assert!(err.message().unwrap().starts_with("Invalid request:"));
    }

    #[tokio::test]
    async fn test_params() {
        let ctx = request("");
        assert_eq!(execute(&chain![url_param("id")], &ctx, None).await.unwrap(), json!("c-1"));
        assert_eq!(execute(&chain![query_param("page")], &ctx, None).await.unwrap(), json!("2"));
        assert_eq!(execute(&chain![query_param("sort")], &ctx, None).await.unwrap(), json!(""));
    }
}
