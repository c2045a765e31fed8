use serde::{Deserialize, Serialize};

/// Task progress polling configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Wait before the second status query, in milliseconds.
    /// TOML: `monitor.initial_delay_ms`. Default: `1000`.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Ceiling for the growing poll interval, in milliseconds.
    /// TOML: `monitor.max_delay_ms`. Default: `10000`.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// In-place retries of a service-unavailable answer within one tick.
    /// TOML: `monitor.max_retries_per_tick`. Default: `3`.
    #[serde(default = "default_max_retries_per_tick")]
    pub max_retries_per_tick: usize,

    /// Wait between in-place retries when the server sends no `Retry-After`.
    /// TOML: `monitor.default_retry_after_ms`. Default: `2000`.
    #[serde(default = "default_retry_after_ms")]
    pub default_retry_after_ms: u64,

    /// Progress endpoint relative to `basic.api_url`; `{task_id}` is substituted.
    /// TOML: `monitor.progress_path`. Default: `generate/progress/{task_id}`.
    #[serde(default = "default_progress_path")]
    pub progress_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries_per_tick: default_max_retries_per_tick(),
            default_retry_after_ms: default_retry_after_ms(),
            progress_path: default_progress_path(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_retries_per_tick() -> usize {
    3
}

fn default_retry_after_ms() -> u64 {
    2000
}

fn default_progress_path() -> String {
    "generate/progress/{task_id}".to_string()
}
