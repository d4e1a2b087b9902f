//! The service's JSON envelope to flat records.
//!
//! Raw replies look like
//! `{"response":{"result":{"Leads":{"row":[{"no":"1","FL":[{"val":"LEADID","content":"1"}]}]}}}}`.
//! A single matching row (or a single field) arrives as a bare object instead
//! of a one-element array; both shapes decode identically.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::CrmError;
use crate::types::Record;

/// Top-level JSON reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    pub response: ResponseBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub uri: Option<String>,
    /// Present when the query matched nothing.
    #[serde(default)]
    pub nodata: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
    #[serde(default)]
    pub result: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default, deserialize_with = "text_or_number")]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "FL", default)]
    cells: Option<OneOrMany<Cell>>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    val: String,
    #[serde(default, deserialize_with = "text_or_number")]
    content: String,
}

fn text_or_number<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// An empty or false `nodata` value does not count as the marker.
fn is_marker_set(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Bool(true) => true,
    }
}

/// Parse raw reply bytes into an envelope.
pub fn decode_json(body: &[u8]) -> Result<ResponseEnvelope, CrmError> {
    serde_json::from_slice(body).map_err(|e| CrmError::DeserializationError(e.to_string()))
}

/// Flatten the rows under `result -> module -> row` into records.
///
/// A "no data" marker yields an empty list. An error envelope yields
/// `RemoteError`. Otherwise a missing path is `MalformedResponse`.
pub fn decode(envelope: &ResponseEnvelope, module: &str) -> Result<Vec<Record>, CrmError> {
    let body = &envelope.response;
    if body.nodata.as_ref().is_some_and(is_marker_set) {
        return Ok(Vec::new());
    }
    if let Some(error) = &body.error {
        return Err(CrmError::RemoteError {
            code: error.code.clone(),
            message: error.message.clone(),
        });
    }

    let result = body.result.as_ref().ok_or_else(|| CrmError::malformed("response/result"))?;
    let module_body = result
        .get(module)
        .ok_or_else(|| CrmError::malformed(format!("response/result/{module}")))?;
    let rows = module_body
        .get("row")
        .ok_or_else(|| CrmError::malformed(format!("response/result/{module}/row")))?;

    let rows = OneOrMany::<Row>::deserialize(rows)
        .map_err(|e| CrmError::DeserializationError(e.to_string()))?
        .into_vec();

    Ok(rows
        .into_iter()
        .map(|row| {
            row.cells
                .map(OneOrMany::into_vec)
                .unwrap_or_default()
                .into_iter()
                .map(|cell| (cell.val, cell.content))
                .collect::<Record>()
        })
        .collect())
}
