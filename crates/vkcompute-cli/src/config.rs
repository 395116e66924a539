//! CLI configuration file.
//!
//! ```toml
//! [engine]
//! enable_validation = true
//! device_index = 0
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vkcompute::EngineConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub device_index: Option<usize>,
    pub validation: bool,
}

impl CliConfig {
    /// Load `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        if let Some(index) = overrides.device_index {
            self.engine.device_index = index;
        }
        if overrides.validation {
            self.engine.enable_validation = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = CliConfig::from_toml_str("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn sections_parse() {
        let config = CliConfig::from_toml_str(
            "[engine]\ndevice_index = 2\n\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n",
        )
        .unwrap();
        assert_eq!(config.engine.device_index, 2);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn engine_values_are_validated() {
        assert!(CliConfig::from_toml_str("[engine]\napi_version = \"3.0\"\n").is_err());
        assert!(CliConfig::from_toml_str("[telemetry]\n").is_err());
    }

    #[test]
    fn flags_override_file() {
        let mut config = CliConfig::from_toml_str("[logging]\nlevel = \"warn\"\n").unwrap();
        config.apply(&Overrides {
            log_level: Some("trace".into()),
            log_format: Some(LogFormat::Compact),
            device_index: Some(1),
            validation: true,
        });
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.engine.device_index, 1);
        assert!(config.engine.enable_validation);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let mut config = CliConfig::from_toml_str("[engine]\nenable_validation = true\n").unwrap();
        config.apply(&Overrides::default());
        assert!(config.engine.enable_validation);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = CliConfig::load(Some(Path::new("/nonexistent/vkcompute.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
        assert_eq!(CliConfig::load(None).unwrap(), CliConfig::default());
    }
}
