use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;
use thiserror::Error as ThisError;
use url::Url;
use vigil_schema::ApiErrorPayload;

/// An outgoing API call, kept as plain data so it can be replayed with a new credential.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post_json<T: Serialize>(url: Url, body: &T) -> Result<Self, serde_json::Error> {
        let mut request = Self::new(Method::POST, url);
        request.body = Some(serde_json::to_value(body)?);
        Ok(request)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_authorization(&mut self, value: &str) -> Result<(), InvalidHeaderValue> {
        let mut header = HeaderValue::from_str(value)?;
        header.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, header);
        Ok(())
    }
}

/// A response as returned by a [`RequestExecutor`](super::RequestExecutor), any status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn json_body(status: StatusCode, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn error_payload(&self) -> Option<ApiErrorPayload> {
        ApiErrorPayload::from_slice(&self.body)
    }
}

/// A request that never produced an HTTP response (connect failure, reset, timeout).
#[derive(Debug, Clone, ThisError)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError(e.to_string())
    }
}

/// Why a request failed, as seen by the expiry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureSignal {
    /// `None` when the transport reported no usable status.
    pub status: Option<StatusCode>,
    pub code: Option<String>,
    pub message: String,
    /// Whether the coordinator attached an access token to the failed request.
    pub token_attached: bool,
}

impl FailureSignal {
    pub fn from_response(response: &ApiResponse, token_attached: bool) -> Self {
        let payload = response.error_payload().unwrap_or_default();
        Self {
            status: Some(response.status),
            code: payload.code,
            message: payload.message.unwrap_or_else(|| {
                response
                    .status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            }),
            token_attached,
        }
    }

    pub fn opaque(message: impl Into<String>, token_attached: bool) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            token_attached,
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.status.is_none()
    }
}

impl fmt::Display for FailureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "status {status}")?,
            None => write!(f, "no status")?,
        }
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        write!(f, ": {}", self.message)
    }
}
