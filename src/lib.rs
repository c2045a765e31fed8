pub mod auth;
pub mod config;
pub mod error;
pub mod progress;
mod utils;

pub use auth::{RefreshCoordinator, TokenStore};
pub use error::{AuthError, TaskError, VigilError};
pub use progress::{MonitorOptions, ProgressSubscription, TaskProgressMonitor};
pub use vigil_schema::{ProgressUpdate, TaskStatus, TokenPair};
