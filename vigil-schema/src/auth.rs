use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh token pair as issued by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenPair {
    pub access_token: String,

    pub refresh_token: String,

    /// Lifetime of `access_token` in seconds, counted from issue time.
    #[serde(default)]
    pub expires_in: i64,

    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in: 0,
            token_type: default_token_type(),
        }
    }

    /// Value for the `Authorization` header, e.g. `Bearer abc`.
    pub fn authorization_value(&self) -> String {
        format!("{} {}", self.scheme(), self.access_token)
    }

    /// Normalized auth scheme; servers commonly answer `bearer` in lowercase.
    pub fn scheme(&self) -> &str {
        if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            self.token_type.as_str()
        }
    }

    /// Absolute expiry, given the instant the pair was issued.
    /// Returns `None` when the server did not announce a lifetime.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.expires_in > 0).then(|| issued_at + Duration::seconds(self.expires_in))
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Body of the token refresh call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshRequestBody {
    pub refresh_token: String,
}
