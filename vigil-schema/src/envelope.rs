use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Success envelope: every API body is wrapped as `{ "data": ... }`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
}

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiErrorPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    #[serde(flatten)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl ApiErrorPayload {
    /// Parses an error body, accepting both a bare payload and one nested under `error`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        #[derive(Deserialize)]
        struct Nested {
            error: ApiErrorPayload,
        }

        if let Ok(nested) = serde_json::from_slice::<Nested>(bytes) {
            return Some(nested.error);
        }
        serde_json::from_slice::<Self>(bytes)
            .ok()
            .filter(|p| p.code.is_some() || p.message.is_some())
    }
}
