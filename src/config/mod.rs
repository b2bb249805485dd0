mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::path::Path;
use std::time::Duration;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            provider: Provider::default(),
            concurrency: default_concurrency(),
            report_dir: default_report_dir(),
            state_dir: default_state_dir(),
            dry_run: false,
            timeout_sec: default_timeout_sec(),
            providers: ProvidersConfig::default(),
            retry: RetryConfig::default(),
            stages: StagesConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config, treating a missing file as "use defaults"
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.timeout_sec == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_sec",
                reason: "must be at least 1".to_string(),
            });
        }

        let temperatures = [
            ("stages.decompose.temperature", self.stages.decompose.temperature),
            ("stages.execute_temperature", self.stages.execute_temperature),
            ("stages.validate.temperature", self.stages.validate.temperature),
            ("stages.synthesize.temperature", self.stages.synthesize.temperature),
        ];
        for (field, value) in temperatures {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is outside [0, 2]", value),
                });
            }
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}
