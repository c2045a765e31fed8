pub mod auth;
pub mod envelope;
pub mod progress;

pub use auth::{RefreshRequestBody, TokenPair};
pub use envelope::{ApiEnvelope, ApiErrorPayload};
pub use progress::{
    DocumentFormat, GeneratedDocument, GenerationMetadata, ProgressStage, ProgressUpdate,
    TaskStatus, TokenUsage,
};
