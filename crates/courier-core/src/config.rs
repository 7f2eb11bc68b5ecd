use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};

/// Attempts after which a record is abandoned.
pub const MAX_ATTEMPTS: u32 = 1000;
pub const NORMAL_INTERVAL: Duration = Duration::from_secs(60);
/// Used while catching up on missed message checks.
pub const SHORT_INTERVAL: Duration = Duration::from_secs(5);
pub const DATABASE_CLEAN_INTERVAL: Duration = Duration::from_secs(3600);

pub type ConfigResult<T> = Result<T, CoreError>;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_attempts: u32,
    pub normal_interval_secs: u64,
    pub short_interval_secs: u64,
    pub database_clean_interval_secs: u64,
    /// Whether this client does proof of work itself or leaves it to servers.
    pub do_pow: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            normal_interval_secs: NORMAL_INTERVAL.as_secs(),
            short_interval_secs: SHORT_INTERVAL.as_secs(),
            database_clean_interval_secs: DATABASE_CLEAN_INTERVAL.as_secs(),
            do_pow: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Configuration,
                format!("invalid engine config: {error}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Configuration,
                format!("failed to read engine config '{}': {error}", path.display()),
            )
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.normal_interval_secs == 0 || self.short_interval_secs == 0 {
            return Err(CoreError::new(
                CoreErrorKind::Configuration,
                "sweep intervals must be non-zero",
            ));
        }
        if self.short_interval_secs > self.normal_interval_secs {
            return Err(CoreError::new(
                CoreErrorKind::Configuration,
                format!(
                    "short interval ({}s) must not exceed normal interval ({}s)",
                    self.short_interval_secs, self.normal_interval_secs
                ),
            ));
        }
        Ok(())
    }

    pub fn normal_interval(&self) -> Duration {
        Duration::from_secs(self.normal_interval_secs)
    }

    pub fn short_interval(&self) -> Duration {
        Duration::from_secs(self.short_interval_secs)
    }

    pub fn database_clean_interval(&self) -> Duration {
        Duration::from_secs(self.database_clean_interval_secs)
    }
}
