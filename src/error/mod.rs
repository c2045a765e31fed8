mod auth;
mod task;
mod vigil;

pub use auth::AuthError;
pub use task::{QueryError, TaskError};
pub use vigil::VigilError;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
