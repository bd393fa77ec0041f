//! Document store collaborator and the stages that talk to it
//!
//! The store handle lives in the request context under a caller-chosen key,
//! as an [`SharedStore`]. An absent document is a 404; every other store
//! failure is a 500.
use async_trait::async_trait;
use rp_core::{BoxError, Context, SharedLogger, Stage, StageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::query;

/// Field holding a document's id.
pub const ID_FIELD: &str = "_id";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no documents in result")]
    NotFound,

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("duplicate id {0}")]
    Duplicate(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches the document with `id` from `collection`, shaped by
    /// `projection` when one is given.
    async fn find_one(
        &self,
        collection: &str,
        id: &str,
        projection: Option<&Value>,
    ) -> Result<Value, StoreError>;

    /// Inserts `document` and returns its id. Documents without an `_id`
    /// get a fresh one.
    async fn insert_one(&self, collection: &str, document: Value) -> Result<String, StoreError>;

    /// Runs an aggregation pipeline (a JSON array of stage objects) over
    /// `collection`.
    async fn aggregate(&self, collection: &str, pipeline: Value) -> Result<Vec<Value>, StoreError>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// In-process store, keyed by collection then id. Scans and aggregations
/// see documents in id order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        id: &str,
        projection: Option<&Value>,
    ) -> Result<Value, StoreError> {
        let document = self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)?;

        match projection {
            Some(spec) => query::project(&document, spec),
            None => Ok(document),
        }
    }

    async fn insert_one(&self, collection: &str, mut document: Value) -> Result<String, StoreError> {
        let fields = document
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidDocument("expected an object".to_string()))?;

        let id = match fields.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Err(StoreError::InvalidDocument(format!("{} must be a string", ID_FIELD))),
            None => Uuid::new_v4().to_string(),
        };
        fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        docs.insert(id.clone(), document);

        tracing::debug!(collection, id = %id, "document inserted");
        Ok(id)
    }

    async fn aggregate(&self, collection: &str, pipeline: Value) -> Result<Vec<Value>, StoreError> {
        let docs: Vec<Value> = self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();

        query::aggregate(docs, &pipeline)
    }
}

fn store_from(ctx: &Context, store_key: &str) -> Result<SharedStore, BoxError> {
    let store = ctx.must_get::<SharedStore>(store_key)?;
    Ok(Arc::clone(&store))
}

/// Fetches the document whose id is the (string) input.
pub struct Find {
    store_key: String,
    collection: String,
    projection: Option<Value>,
}

pub fn find(store_key: impl Into<String>, collection: impl Into<String>) -> Find {
    Find {
        store_key: store_key.into(),
        collection: collection.into(),
        projection: None,
    }
}

impl Find {
    /// Shapes the fetched document, e.g. `json!({"email": 0})`.
    pub fn projection(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }
}

#[async_trait]
impl Stage for Find {
    fn display(&self) -> String {
        format!("  => Find(\"{}\") =>", self.collection)
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        let store = store_from(ctx, &self.store_key)?;
        let id = input
            .as_str()
            .ok_or_else(|| StoreError::InvalidDocument("id must be a string".to_string()))?;
        Ok(store
            .find_one(&self.collection, id, self.projection.as_ref())
            .await?)
    }

    fn on_error(&self, err: BoxError) -> StageError {
        match err.downcast_ref::<StoreError>() {
            Some(StoreError::NotFound) => StageError::not_found("Find: Document not found"),
            _ => StageError::internal(format!("Find: {}", err)),
        }
    }
}

/// Inserts the input document and outputs the new id.
pub struct Insert {
    store_key: String,
    collection: String,
}

pub fn insert(store_key: impl Into<String>, collection: impl Into<String>) -> Insert {
    Insert {
        store_key: store_key.into(),
        collection: collection.into(),
    }
}

#[async_trait]
impl Stage for Insert {
    fn display(&self) -> String {
        format!("  => Insert(\"{}\") =>", self.collection)
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        let store = store_from(ctx, &self.store_key)?;
        let id = store.insert_one(&self.collection, input).await?;
        Ok(Value::String(id))
    }

    fn on_error(&self, err: BoxError) -> StageError {
        StageError::internal(format!("Insert: {}", err))
    }
}

/// Runs the input, an aggregation pipeline, over a collection and outputs
/// the array of results.
///
/// `Pipe<T>` decodes every result into `T` and re-encodes it, so the output
/// items always have `T`'s shape.
pub struct Pipe<T = Value> {
    store_key: String,
    collection: String,
    _results: PhantomData<fn() -> T>,
}

pub fn pipe(store_key: impl Into<String>, collection: impl Into<String>) -> Pipe {
    pipe_as::<Value>(store_key, collection)
}

pub fn pipe_as<T>(store_key: impl Into<String>, collection: impl Into<String>) -> Pipe<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    Pipe {
        store_key: store_key.into(),
        collection: collection.into(),
        _results: PhantomData,
    }
}

#[async_trait]
impl<T> Stage for Pipe<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    fn display(&self) -> String {
        format!("  => Pipe(\"{}\") =>", self.collection)
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        let store = store_from(ctx, &self.store_key)?;
        let results = store.aggregate(&self.collection, input).await?;

        let typed = results
            .into_iter()
            .map(|doc| serde_json::from_value::<T>(doc).and_then(serde_json::to_value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(typed))
    }

    fn on_error(&self, err: BoxError) -> StageError {
        StageError::internal(format!("Pipe: {}", err))
    }
}
