use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error as ThisError;

use super::IsRetryable;

pub const TASK_EXPIRED_SUMMARY: &str = "Task expired";
pub const TASK_EXPIRED_DESCRIPTION: &str =
    "The generation task was not found or has expired. Start a new generation.";

/// One failed status query, as reported by a `StatusQuery` implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// `None` for failures that never produced an HTTP status.
    pub status: Option<StatusCode>,
    pub code: Option<String>,
    pub message: String,
    /// Server-supplied wait before the next attempt.
    pub retry_after: Option<Duration>,
}

impl QueryError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn opaque(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(StatusCode::NOT_FOUND)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "status query failed ({status})")?,
            None => write!(f, "status query failed (no status)")?,
        }
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for QueryError {}

impl IsRetryable for QueryError {
    /// Only service-unavailable answers are retried in place.
    fn is_retryable(&self) -> bool {
        self.status == Some(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Terminal errors delivered by a task progress monitor.
#[derive(Debug, Clone, ThisError)]
pub enum TaskError {
    #[error("Task service unavailable after {attempts} attempts: {last}")]
    TransientServiceUnavailable { attempts: usize, last: QueryError },

    #[error("{summary}: {description}")]
    TaskExpired {
        task_id: String,
        summary: String,
        description: String,
        #[source]
        cause: QueryError,
    },

    #[error(transparent)]
    Unclassified(QueryError),
}

impl TaskError {
    pub fn task_expired(task_id: impl Into<String>, cause: QueryError) -> Self {
        TaskError::TaskExpired {
            task_id: task_id.into(),
            summary: TASK_EXPIRED_SUMMARY.to_string(),
            description: TASK_EXPIRED_DESCRIPTION.to_string(),
            cause,
        }
    }

    /// The query error this terminal error was derived from.
    pub fn query_error(&self) -> &QueryError {
        match self {
            TaskError::TransientServiceUnavailable { last, .. } => last,
            TaskError::TaskExpired { cause, .. } => cause,
            TaskError::Unclassified(e) => e,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.query_error().status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_service_unavailable_is_retryable() {
        assert!(QueryError::new(StatusCode::SERVICE_UNAVAILABLE, "busy").is_retryable());
        assert!(!QueryError::new(StatusCode::NOT_FOUND, "gone").is_retryable());
        assert!(!QueryError::new(StatusCode::INTERNAL_SERVER_ERROR, "boom").is_retryable());
        assert!(!QueryError::opaque("reset").is_retryable());
    }

    #[test]
    fn task_expired_carries_user_facing_text() {
        let err = TaskError::task_expired("t-9", QueryError::new(StatusCode::NOT_FOUND, "nope"));
        assert_eq!(
            err.to_string(),
            format!("{TASK_EXPIRED_SUMMARY}: {TASK_EXPIRED_DESCRIPTION}")
        );
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn display_includes_code() {
        let err = QueryError::new(StatusCode::BAD_REQUEST, "bad").with_code("VALIDATION_ERROR");
        assert_eq!(
            err.to_string(),
            "status query failed (400 Bad Request) [VALIDATION_ERROR]: bad"
        );
    }
}
