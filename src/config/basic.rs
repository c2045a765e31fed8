use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

/// Compile-time default for `basic.api_url`, injected by `build.rs` from `.env`.
static DEFAULT_API_URL: LazyLock<Url> = LazyLock::new(|| {
    let raw = option_env!("VIGIL_DEFAULT_API_URL").unwrap_or("http://127.0.0.1:8000/api/");
    Url::parse(raw).unwrap_or_else(|_| {
        Url::parse("http://127.0.0.1:8000/api/").expect("valid fallback API URL")
    })
});

/// Basic (core) configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicConfig {
    /// Log level for tracing subscriber initialization (e.g., "error", "warn", "info", "debug", "trace").
    /// TOML: `basic.loglevel`. Default: `info`.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Base URL of the API governed by the refresh coordinator. Only requests under this
    /// origin and path receive the access token.
    /// TOML: `basic.api_url`. Default: `http://127.0.0.1:8000/api/`.
    #[serde(default = "default_api_url")]
    pub api_url: Url,

    /// Optional upstream HTTP proxy. If set, used for reqwest clients.
    /// TOML: `basic.proxy`. Example: `http://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Allow HTTP/2 multiplexing for reqwest clients; disabled forces HTTP/1.
    /// TOML: `basic.enable_multiplexing`. Default: `false`.
    #[serde(default)]
    pub enable_multiplexing: bool,

    /// Whole-request timeout in seconds, enforced by the HTTP client.
    /// TOML: `basic.request_timeout_secs`. Default: `30`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// TCP connect timeout in seconds.
    /// TOML: `basic.connect_timeout_secs`. Default: `5`.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            loglevel: default_loglevel(),
            api_url: default_api_url(),
            proxy: None,
            enable_multiplexing: false,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_api_url() -> Url {
    DEFAULT_API_URL.clone()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}
