use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Token refresh configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Refresh endpoint, relative to `basic.api_url`.
    /// TOML: `auth.refresh_path`. Default: `auth/refresh`.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// API error codes that mark a 401 as an expired/invalid access token.
    /// TOML: `auth.expired_codes`.
    #[serde(default = "default_expired_codes")]
    pub expired_codes: Vec<String>,

    /// Treat a failure without any HTTP status as token expiry when a token was attached.
    /// Some transports mask authorization failures as connectivity errors.
    /// TOML: `auth.opaque_failure_is_expiry`. Default: `true`.
    #[serde(default = "default_opaque_failure_is_expiry")]
    pub opaque_failure_is_expiry: bool,

    /// Initial access token for the session store.
    /// TOML: `auth.access_token`. Env: `VIGIL_AUTH__ACCESS_TOKEN`.
    #[serde(default, deserialize_with = "deserialize_token_lax")]
    pub access_token: Option<String>,

    /// Initial refresh token for the session store.
    /// TOML: `auth.refresh_token`. Env: `VIGIL_AUTH__REFRESH_TOKEN`.
    #[serde(default, deserialize_with = "deserialize_token_lax")]
    pub refresh_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_path: default_refresh_path(),
            expired_codes: default_expired_codes(),
            opaque_failure_is_expiry: default_opaque_failure_is_expiry(),
            access_token: None,
            refresh_token: None,
        }
    }
}

/// Accepts strings and numbers (env values are parsed loosely); blank means unset.
fn deserialize_token_lax<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;

    let raw = match v {
        Value::Null => return Ok(None),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(serde::de::Error::custom(
                "expected a string or a number for auth token",
            ));
        }
    };
    let trimmed = raw.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

fn default_refresh_path() -> String {
    "auth/refresh".to_string()
}

fn default_expired_codes() -> Vec<String> {
    [
        "AUTH_TOKEN_EXPIRED",
        "AUTH_INVALID_TOKEN",
        "token_expired",
        "invalid_token",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_opaque_failure_is_expiry() -> bool {
    true
}
