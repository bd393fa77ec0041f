//! Data Model: the response shape produced by terminal stages
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stage::status_code;

/// Reserved key marking a pipeline value as a [`Response`].
///
/// Keys starting with `$` are operator syntax for document stores, so no
/// stored document or bound request body carries it.
pub const RESPONSE_TAG: &str = "$response";

/// Successful network response, produced as the output of a chain's last stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Response {
    #[serde(with = "status_code")]
    pub code: StatusCode,
    pub payload: Value,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Tagged {
    #[serde(rename = "$response")]
    response: Response,
}

impl Response {
    pub fn new(code: StatusCode, payload: Value) -> Self {
        Self { code, payload }
    }

    pub fn ok(payload: Value) -> Self {
        Self::new(StatusCode::OK, payload)
    }

    /// Pipeline value form: `{"$response": {"code": 200, "payload": ...}}`.
    pub fn into_value(self) -> Value {
        let mut inner = Map::new();
        inner.insert("code".to_string(), Value::from(self.code.as_u16()));
        inner.insert("payload".to_string(), self.payload);

        let mut tagged = Map::new();
        tagged.insert(RESPONSE_TAG.to_string(), Value::Object(inner));
        Value::Object(tagged)
    }

    /// Reads a value produced by [`Response::into_value`]. Anything else,
    /// including a bare `{"code", "payload"}` document, is rejected.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value::<Tagged>(value).map(|tagged| tagged.response)
    }
}
