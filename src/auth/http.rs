use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};
use std::{sync::LazyLock, time::Duration};
use tracing::{debug, warn};
use url::Url;
use vigil_schema::{ApiEnvelope, RefreshRequestBody, TokenPair};

use super::coordinator::{RefreshCall, RequestExecutor};
use super::request::{ApiRequest, ApiResponse, TransportError};
use crate::config::{BasicConfig, Config};
use crate::error::{AuthError, VigilError};
use crate::utils::{endpoint, logging::body_preview};

const USER_AGENT: &str = concat!("vigil/", env!("CARGO_PKG_VERSION"));

/// Builds the shared reqwest client from `basic` settings.
pub fn build_http_client(cfg: &BasicConfig) -> Result<reqwest::Client, VigilError> {
    let mut headers = HeaderMap::new();
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .timeout(Duration::from_secs(cfg.request_timeout_secs));

    if let Some(proxy_url) = cfg.proxy.as_ref() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }

    if !cfg.enable_multiplexing {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        builder = builder
            .http1_only()
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::from_secs(0));
    } else {
        builder = builder.http2_adaptive_window(true);
    }

    Ok(builder.default_headers(headers).build()?)
}

/// [`RequestExecutor`] over a reqwest client.
#[derive(Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();

        debug!(
            method = %request.method,
            url = %request.url,
            %status,
            "Request completed"
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

// Only connection setup failures are retried: the request never reached the server, so
// the refresh token was not consumed.
static CONNECT_RETRY_POLICY: LazyLock<ExponentialBuilder> = LazyLock::new(|| {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_millis(300))
        .with_max_times(2)
        .with_jitter()
});

/// [`RefreshCall`] posting the refresh token to the API's refresh endpoint.
#[derive(Clone)]
pub struct HttpRefreshCall {
    client: reqwest::Client,
    url: Url,
}

impl HttpRefreshCall {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    /// Targets `auth.refresh_path` under `basic.api_url`.
    pub fn from_config(client: reqwest::Client, cfg: &Config) -> Result<Self, VigilError> {
        let url = endpoint::resolve(&cfg.basic.api_url, &cfg.auth.refresh_path, &[]).ok_or_else(
            || {
                VigilError::UnexpectedError(format!(
                    "cannot resolve refresh endpoint {:?} against {}",
                    cfg.auth.refresh_path, cfg.basic.api_url
                ))
            },
        )?;
        Ok(Self::new(client, url))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RefreshCall for HttpRefreshCall {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let body = RefreshRequestBody {
            refresh_token: refresh_token.to_string(),
        };

        // Bypasses the coordinator: the refresh call itself must never trigger a refresh.
        let resp = (|| async {
            self.client
                .post(self.url.clone())
                .json(&body)
                .send()
                .await
        })
        .retry(*CONNECT_RETRY_POLICY)
        .when(|e: &reqwest::Error| e.is_connect())
        .notify(|err, dur: Duration| {
            warn!(
                "Token refresh connect error {} retrying after {:?}",
                err.to_string(),
                dur
            );
        })
        .await
        .map_err(|e| AuthError::RefreshFailed {
            status: e.status(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| AuthError::RefreshFailed {
            status: Some(status),
            message: format!("failed to read refresh response: {e}"),
        })?;

        if !status.is_success() {
            let payload = vigil_schema::ApiErrorPayload::from_slice(&bytes).unwrap_or_default();
            debug!(
                %status,
                code = ?payload.code,
                body = %body_preview(&bytes),
                "Refresh endpoint rejected the refresh token"
            );
            return Err(AuthError::RefreshFailed {
                status: Some(status),
                message: payload
                    .message
                    .or(payload.code)
                    .unwrap_or_else(|| "refresh rejected".to_string()),
            });
        }

        // Accept both the enveloped `{ "data": {...} }` form and a bare token pair.
        serde_json::from_slice::<ApiEnvelope<TokenPair>>(&bytes)
            .map(|envelope| envelope.data)
            .or_else(|_| serde_json::from_slice::<TokenPair>(&bytes))
            .map_err(|e| AuthError::RefreshFailed {
                status: Some(status),
                message: format!("malformed refresh response: {e}"),
            })
    }
}
