//! rp stages: reference stages for request pipelines
//!
//! Small building blocks that cover the common steps of an HTTP handler.
//! Anything more specific is a [`func`] or a custom [`rp_core::Stage`].
//!
//! # Pipeline Flow
//!
//! ```text
//! Req.Body → ["body"] → Req.URL("id") → .(Uuid) → Find("customers") → Response(200)
//!    ↓          ↓                                       ↓
//!  Bind      CtxSet                                 DocumentStore
//! ```

mod catch_prefix;
mod context;
mod conversions;
mod func;
mod query;
mod request;
mod respond;
mod store;

pub use catch_prefix::{CatchPrefix, StageExt};
pub use context::{ctx_get, ctx_set, CtxGet, CtxSet};
pub use conversions::{
    field_value, to_time, to_time_in_location, to_uuid, FieldValue, ToTime, ToTimeInLocation, ToUuid,
};
pub use func::{func, func_async, AsyncFunc, Func};
pub use request::{
    bind, query_param, url_param, Bind, QueryParam, RequestData, UrlParam, REQUEST_BODY,
    REQUEST_PARAMS, REQUEST_QUERY,
};
pub use respond::{respond, Respond};
pub use store::{
    find, insert, pipe, pipe_as, DocumentStore, Find, Insert, MemoryStore, Pipe, SharedStore,
    StoreError, ID_FIELD,
};
