//! Response decoding helpers: error-body extraction and list normalization.

use curator_shared::{CuratorError, Dataset, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// `GET /dataset` may answer with a bare object instead of an array.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Dataset>),
    One(Box<Dataset>),
}

/// Decode a dataset listing, normalizing a single object (or `null`) into a list.
pub(crate) fn decode_dataset_list(endpoint: &str, body: &[u8]) -> Result<Vec<Dataset>> {
    let parsed: Option<OneOrMany> = decode(endpoint, body)?;
    Ok(match parsed {
        Some(OneOrMany::Many(list)) => list,
        Some(OneOrMany::One(dataset)) => vec![*dataset],
        None => Vec::new(),
    })
}

/// Decode a JSON body, mapping failures to [`CuratorError::Parse`].
pub(crate) fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| CuratorError::parse(format!("{endpoint}: unexpected response body: {e}")))
}

/// Decode an opaque body; an empty body becomes `null`.
pub(crate) fn decode_opaque(endpoint: &str, body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    decode(endpoint, body)
}

/// Human-readable message for a non-2xx response.
///
/// Prefers `detail`, then `message`. FastAPI validation errors carry `detail`
/// as a list of `{msg}` objects, which are joined. Falls back to `HTTP {status}`.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(extract_detail)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

fn extract_detail(body: &Value) -> Option<String> {
    let field = body
        .get("detail")
        .filter(|v| !v.is_null())
        .or_else(|| body.get("message"))?;

    match field {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        _ => None,
    }
}
