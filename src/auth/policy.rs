use reqwest::StatusCode;

use super::request::FailureSignal;
use crate::config::AuthConfig;

/// Decides whether a failed request means "the access token expired".
///
/// Overridable so deployments can disable or replace the opaque-failure heuristic.
pub trait ExpiryPolicy: Send + Sync {
    fn is_token_expired(&self, signal: &FailureSignal) -> bool;
}

/// 401 with a known expired/invalid-token code, or (optionally) an opaque failure of a
/// request that carried a token.
#[derive(Debug, Clone)]
pub struct DefaultExpiryPolicy {
    expired_codes: Vec<String>,
    opaque_failure_is_expiry: bool,
}

impl DefaultExpiryPolicy {
    pub fn new(expired_codes: Vec<String>, opaque_failure_is_expiry: bool) -> Self {
        Self {
            expired_codes,
            opaque_failure_is_expiry,
        }
    }

    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self::new(cfg.expired_codes.clone(), cfg.opaque_failure_is_expiry)
    }

    fn is_expired_code(&self, code: &str) -> bool {
        self.expired_codes
            .iter()
            .any(|known| known.eq_ignore_ascii_case(code))
    }
}

impl Default for DefaultExpiryPolicy {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

impl ExpiryPolicy for DefaultExpiryPolicy {
    fn is_token_expired(&self, signal: &FailureSignal) -> bool {
        // Heuristic: some transports surface an auth rejection as a bare network error.
        if signal.is_opaque() {
            return self.opaque_failure_is_expiry && signal.token_attached;
        }
        signal.status == Some(StatusCode::UNAUTHORIZED)
            && signal
                .code
                .as_deref()
                .is_some_and(|code| self.is_expired_code(code))
    }
}
