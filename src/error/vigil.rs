use thiserror::Error as ThisError;

use super::auth::AuthError;
use super::task::TaskError;

#[derive(Debug, ThisError)]
pub enum VigilError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl From<figment::Error> for VigilError {
    fn from(e: figment::Error) -> Self {
        VigilError::Config(Box::new(e))
    }
}
