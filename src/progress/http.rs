use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use vigil_schema::{ApiEnvelope, ProgressUpdate};

use super::monitor::StatusQuery;
use crate::auth::{ApiRequest, ApiResponse, RefreshCoordinator};
use crate::config::MonitorConfig;
use crate::error::{AuthError, QueryError};
use crate::utils::{endpoint, logging::body_preview, retry_after::parse_retry_after};

/// [`StatusQuery`] over the progress endpoint, dispatched through the refresh coordinator
/// so polling keeps working across access token expiry.
#[derive(Clone)]
pub struct HttpStatusQuery {
    coordinator: RefreshCoordinator,
    path_template: String,
}

impl HttpStatusQuery {
    /// `path_template` is relative to the coordinator's API base; `{task_id}` is substituted.
    pub fn new(coordinator: RefreshCoordinator, path_template: impl Into<String>) -> Self {
        Self {
            coordinator,
            path_template: path_template.into(),
        }
    }

    pub fn from_config(coordinator: RefreshCoordinator, cfg: &MonitorConfig) -> Self {
        Self::new(coordinator, cfg.progress_path.clone())
    }
}

#[async_trait]
impl StatusQuery for HttpStatusQuery {
    async fn query(&self, task_id: &str) -> Result<ProgressUpdate, QueryError> {
        let url = endpoint::resolve(
            self.coordinator.api_base(),
            &self.path_template,
            &[("task_id", task_id)],
        )
        .ok_or_else(|| {
            QueryError::opaque(format!(
                "cannot build progress URL from template {:?}",
                self.path_template
            ))
        })?;

        let resp = self
            .coordinator
            .send(ApiRequest::get(url))
            .await
            .map_err(query_error_from_auth)?;

        if !resp.is_success() {
            debug!(
                task_id,
                status = %resp.status,
                body = %body_preview(&resp.body),
                "Progress endpoint returned an error"
            );
            return Err(query_error_from_response(&resp));
        }

        resp.json::<ApiEnvelope<ProgressUpdate>>()
            .map(|envelope| envelope.data)
            .map_err(|e| {
                QueryError::new(resp.status, format!("malformed progress payload: {e}"))
                    .with_code("BAD_PAYLOAD")
            })
    }
}

fn query_error_from_response(resp: &ApiResponse) -> QueryError {
    let payload = resp.error_payload().unwrap_or_default();
    let header_hint = resp
        .headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, Utc::now()));
    // Some endpoints put the hint in the body, e.g. `{"details": {"retry_after": 5}}`.
    let body_hint = payload
        .details
        .as_ref()
        .and_then(|d| d.get("retry_after"))
        .or_else(|| payload.extra.get("retry_after"))
        .and_then(Value::as_f64)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

    QueryError {
        status: Some(resp.status),
        code: payload.code,
        message: payload.message.unwrap_or_else(|| {
            resp.status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        }),
        retry_after: header_hint.or(body_hint),
    }
}

fn query_error_from_auth(err: AuthError) -> QueryError {
    match err {
        AuthError::Request(signal) => QueryError {
            status: signal.status,
            code: signal.code,
            message: signal.message,
            retry_after: None,
        },
        other => QueryError {
            status: other.status(),
            code: Some(
                match other {
                    AuthError::ExpiredToken => "AUTH_TOKEN_EXPIRED",
                    AuthError::NoRefreshToken => "AUTH_REFRESH_TOKEN_NOT_FOUND",
                    AuthError::RefreshFailed { .. } => "AUTH_REFRESH_FAILED",
                    AuthError::RefreshAborted | AuthError::Request(_) => "AUTH_ERROR",
                }
                .to_string(),
            ),
            message: other.to_string(),
            retry_after: None,
        },
    }
}
