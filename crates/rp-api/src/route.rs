//! Route: binds one chain to one (method, path) pair of an axum router
use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{Method, StatusCode},
    routing::{on, MethodFilter},
    Json, Router,
};
use rp_core::{execute, Chain, Context, Response, SharedLogger};
use rp_stages::RequestData;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

type ContextInit = Arc<dyn Fn(&Context) + Send + Sync>;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("unsupported HTTP method {0}")]
    UnsupportedMethod(Method),
}

/// A pipeline served at one endpoint.
///
/// Every request gets a fresh [`Context`] holding the request parts (see
/// [`rp_stages::REQUEST_BODY`] and friends) plus whatever the `with_context`
/// initializers put in it, then runs `pipe` once.
pub struct Route {
    pub method: Method,
    pub path: String,
    pub pipe: Chain,
    pub logger: Option<SharedLogger>,
    init: Vec<ContextInit>,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, pipe: Chain) -> Self {
        Self {
            method,
            path: path.into(),
            pipe,
            logger: None,
            init: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>, pipe: Chain) -> Self {
        Self::new(Method::GET, path, pipe)
    }

    pub fn post(path: impl Into<String>, pipe: Chain) -> Self {
        Self::new(Method::POST, path, pipe)
    }

    pub fn with_logger(mut self, logger: Option<SharedLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Runs `init` on each request's context before the pipeline starts.
    pub fn with_context(mut self, init: impl Fn(&Context) + Send + Sync + 'static) -> Self {
        self.init.push(Arc::new(init));
        self
    }

    /// Executes the pipeline for one request and returns the status code and
    /// JSON body to send back.
    pub async fn run(&self, request: RequestData) -> (StatusCode, Value) {
        let ctx = Context::new();
        request.install(&ctx);
        for init in &self.init {
            init(&ctx);
        }

        match execute(&self.pipe, &ctx, self.logger.as_ref()).await {
            Ok(out) => match Response::from_value(out) {
                Ok(response) => (response.code, response.payload),
                Err(err) => {
                    tracing::error!(path = %self.path, error = %err, "pipeline did not end with a response");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": "pipeline did not produce a response" }),
                    )
                }
            },
            Err(err) => (err.code, err.payload),
        }
    }
}

/// Registers `route` on `router`.
pub fn add_route(router: Router, route: Route) -> Result<Router, RouteError> {
    let filter = MethodFilter::try_from(route.method.clone())
        .map_err(|_| RouteError::UnsupportedMethod(route.method.clone()))?;
    let path = route.path.clone();
    let route = Arc::new(route);

    let handler = move |params: Option<Path<HashMap<String, String>>>,
                        Query(query): Query<HashMap<String, String>>,
                        body: Bytes| {
        let route = Arc::clone(&route);
        async move {
            let request = RequestData {
                body: body.to_vec(),
                params: params.map(|Path(params)| params).unwrap_or_default(),
                query,
            };
            let (code, payload) = route.run(request).await;
            (code, Json(payload))
        }
    };

    Ok(router.route(&path, on(filter, handler)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rp_core::{chain, StageError};
    use rp_stages::{ctx_get, func, respond, url_param};

    #[tokio::test]
    async fn test_run_maps_response() {
        let route = Route::get("/items/{id}", chain![url_param("id"), respond(StatusCode::OK)]);
        let request = RequestData {
            params: HashMap::from([("id".to_string(), "7".to_string())]),
            ..Default::default()
        };

        assert_eq!(route.run(request).await, (StatusCode::OK, json!("7")));
    }

    #[tokio::test]
    async fn test_run_maps_stage_error() {
        let route = Route::get("/missing", chain![ctx_get("nothing"), respond(StatusCode::OK)]);
        let (code, payload) = route.run(RequestData::default()).await;

        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(payload, json!({ "error": "Key not found: nothing" }));
    }

    #[tokio::test]
    async fn test_run_without_response_is_server_error() {
        let route = Route::get("/raw", chain![func("raw", |_, _| Ok(json!(1)))]);
        let (code, _) = route.run(RequestData::default()).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_document_shaped_like_response_is_server_error() {
        let route = Route::get(
            "/shipments/{id}",
            chain![func("shipment", |_, _| Ok(json!({ "code": 404, "payload": "shipment code" })))],
        );
        let (code, payload) = route.run(RequestData::default()).await;

        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(payload, json!({ "error": "pipeline did not produce a response" }));
    }

    #[tokio::test]
    async fn test_context_initializers_run_per_request() {
        let route = Route::get("/tenant", chain![ctx_get("tenant"), respond(StatusCode::OK)])
            .with_context(|ctx| ctx.set_value("tenant", json!("acme")));

        assert_eq!(route.run(RequestData::default()).await, (StatusCode::OK, json!("acme")));
    }

    #[tokio::test]
    async fn test_custom_status_passes_through() {
        let route = Route::post(
            "/teapot",
            chain![func("brew", |_, _| Err("no".into()))
                .on_error(|_| StageError::with_message(StatusCode::IM_A_TEAPOT, "short and stout"))],
        );
        let (code, payload) = route.run(RequestData::default()).await;
        assert_eq!(code, StatusCode::IM_A_TEAPOT);
        assert_eq!(payload, json!({ "error": "short and stout" }));
    }
}
