use reqwest::StatusCode;
use thiserror::Error as ThisError;

use crate::auth::FailureSignal;

/// Failures surfaced by the refresh coordinator.
///
/// `Clone` because one refresh outcome is fanned out to every request queued on it.
#[derive(Debug, Clone, ThisError)]
pub enum AuthError {
    /// The replayed request was rejected as expired again, even with the refreshed token.
    #[error("Access token rejected as expired after refresh")]
    ExpiredToken,

    #[error("No refresh token available; re-authentication required")]
    NoRefreshToken,

    #[error("Token refresh failed{}: {message}", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    RefreshFailed {
        status: Option<StatusCode>,
        message: String,
    },

    /// The refresh cycle ended without publishing an outcome.
    #[error("Token refresh was aborted before publishing an outcome")]
    RefreshAborted,

    #[error("Request failed: {0}")]
    Request(FailureSignal),
}

impl AuthError {
    /// True when the caller should drop the session and force a new login.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::ExpiredToken | AuthError::NoRefreshToken | AuthError::RefreshFailed { .. }
        )
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AuthError::RefreshFailed { status, .. } => *status,
            AuthError::Request(signal) => signal.status,
            AuthError::ExpiredToken | AuthError::NoRefreshToken => Some(StatusCode::UNAUTHORIZED),
            AuthError::RefreshAborted => None,
        }
    }
}
