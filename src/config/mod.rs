mod auth;
mod basic;
mod monitor;

pub use auth::AuthConfig;
pub use basic::BasicConfig;
pub use monitor::MonitorConfig;

use crate::error::VigilError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// API endpoint and HTTP client settings (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Token refresh settings (see `auth` table in config.toml).
    #[serde(default)]
    pub auth: AuthConfig,

    /// Task progress polling settings (see `monitor` table in config.toml).
    #[serde(default)]
    pub monitor: MonitorConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "VIGIL_";

impl Config {
    /// Builds a Figment that merges defaults, an optional config TOML file and
    /// `VIGIL_`-prefixed environment variables (`VIGIL_MONITOR__MAX_DELAY_MS=5000`).
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads and validates configuration.
    pub fn load() -> Result<Self, VigilError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, VigilError> {
        let cfg: Self = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), VigilError> {
        if self.basic.api_url.cannot_be_a_base() {
            return Err(VigilError::UnexpectedError(format!(
                "basic.api_url must be a base URL, got {}",
                self.basic.api_url
            )));
        }
        if self.monitor.max_delay_ms == 0 {
            return Err(VigilError::UnexpectedError(
                "monitor.max_delay_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Global, lazily-initialized configuration instance.
///
/// Binaries only; library types take explicit config values.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|err| panic!("failed to load configuration: {err}"))
});
