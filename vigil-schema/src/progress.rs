use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed and failed tasks never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    #[default]
    Context,
    Rendering,
    Completed,
}

/// One progress snapshot of a generation task.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub task_id: String,

    pub status: TaskStatus,

    #[serde(default)]
    pub stage: ProgressStage,

    /// Always within `0..=100`; fractional or out-of-range values are rounded and clamped.
    #[serde(default, deserialize_with = "deserialize_percentage_lax")]
    pub percentage: u8,

    #[serde(default)]
    pub message: String,

    /// Estimated seconds until completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<GeneratedDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressUpdate {
    pub fn new(task_id: impl Into<String>, status: TaskStatus, percentage: u8) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            stage: ProgressStage::default(),
            percentage: percentage.min(100),
            message: String::new(),
            eta: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

fn deserialize_percentage_lax<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;

    match v {
        Value::Number(n) => {
            let raw = n.as_f64().unwrap_or_default();
            Ok(raw.round().clamp(0.0, 100.0) as u8)
        }
        Value::Null => Ok(0),
        _ => Err(serde::de::Error::custom("expected a number for percentage")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Markdown,
    Html,
    Text,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub format: DocumentFormat,
    pub template_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<GenerationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<TokenUsage>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}
