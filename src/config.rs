//! Configuration file support for ocrsegment
//!
//! Supports TOML configuration files with the following search order:
//! 1. `--config <path>` - explicitly specified path
//! 2. `./ocrsegment.toml` - current directory
//! 3. `~/.config/ocrsegment/config.toml` - user config
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [ocropy]
//! python = "/opt/ocropy/venv/bin/python2"
//! ocropy_path = "/opt/ocropy/"
//! additional_args = "--threshold 0.5"
//!
//! [kraken]
//! environment = "conda run -n kraken"
//! additional_args = "--device cpu"
//! ```
//!
//! Command prefixes and additional arguments are split with shell quoting
//! rules, so `"/models/my model.mlmodel"` stays one argument.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::util::split_args;

/// Default interpreter used to run `ocropus-nlbin`
pub const DEFAULT_PYTHON: &str = "python2";

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Command string that cannot be split into arguments
    #[error("Invalid {field}: {message}")]
    InvalidArgs { field: &'static str, message: String },
}

fn parse_args(field: &'static str, value: &str) -> Result<Vec<String>, ConfigError> {
    split_args(value).map_err(|e| ConfigError::InvalidArgs {
        field,
        message: e.to_string(),
    })
}

/// Settings for the ocropy binarization step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcropyConfig {
    /// Interpreter command, may include leading arguments
    pub python: String,

    /// Directory containing `ocropus-nlbin`; empty means resolve from PATH
    pub ocropy_path: String,

    /// Extra arguments appended to every invocation
    pub additional_args: String,
}

impl Default for OcropyConfig {
    fn default() -> Self {
        Self {
            python: DEFAULT_PYTHON.to_string(),
            ocropy_path: String::new(),
            additional_args: String::new(),
        }
    }
}

impl OcropyConfig {
    /// Interpreter command as an argument vector
    pub fn python_command(&self) -> Result<Vec<String>, ConfigError> {
        parse_args("ocropy.python", &self.python)
    }

    /// Extra arguments as an argument vector
    pub fn extra_args(&self) -> Result<Vec<String>, ConfigError> {
        parse_args("ocropy.additional_args", &self.additional_args)
    }

    /// Check that every command string can be split
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.python_command()?;
        self.extra_args()?;
        Ok(())
    }
}

/// Settings for the kraken segmentation step
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KrakenConfig {
    /// Command prefix activating the kraken environment, e.g. `conda run -n kraken`
    pub environment: String,

    /// Extra arguments appended after the `segment` subcommand
    pub additional_args: String,
}

impl KrakenConfig {
    /// Environment prefix as an argument vector
    pub fn environment_prefix(&self) -> Result<Vec<String>, ConfigError> {
        parse_args("kraken.environment", &self.environment)
    }

    /// Extra arguments as an argument vector
    pub fn extra_args(&self) -> Result<Vec<String>, ConfigError> {
        parse_args("kraken.additional_args", &self.additional_args)
    }

    /// Check that every command string can be split
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.environment_prefix()?;
        self.extra_args()?;
        Ok(())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Binarization settings
    #[serde(default)]
    pub ocropy: OcropyConfig,

    /// Segmentation settings
    #[serde(default)]
    pub kraken: KrakenConfig,
}

impl Config {
    /// Load configuration from the default search path
    ///
    /// Search order:
    /// 1. `./ocrsegment.toml`
    /// 2. `~/.config/ocrsegment/config.toml`
    /// 3. Default values (if no file found)
    pub fn load() -> Result<Self, ConfigError> {
        for path in Self::search_paths() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// Command strings with unbalanced quotes are rejected here.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.ocropy.validate()?;
        config.kraken.validate()?;
        Ok(config)
    }

    /// Get config file search paths
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("ocrsegment.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("ocrsegment").join("config.toml"));
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // CFG-001: Config::default
    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.ocropy.python, "python2");
        assert_eq!(config.ocropy.ocropy_path, "");
        assert_eq!(config.ocropy.additional_args, "");
        assert_eq!(config.kraken.environment, "");
        assert_eq!(config.kraken.additional_args, "");
    }

    // CFG-002: Config::load_from_path (existing file)
    #[test]
    fn test_config_load_from_path_existing() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[ocropy]
python = "/usr/bin/python2.7"
ocropy_path = "/opt/ocropy/"

[kraken]
environment = "conda run -n kraken"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&config_path).unwrap();
        assert_eq!(config.ocropy.python, "/usr/bin/python2.7");
        assert_eq!(config.ocropy.ocropy_path, "/opt/ocropy/");
        assert_eq!(
            config.kraken.environment_prefix().unwrap(),
            vec!["conda", "run", "-n", "kraken"]
        );
    }

    // CFG-003: Config::load_from_path (non-existent file)
    #[test]
    fn test_config_load_from_path_not_found() {
        let result = Config::load_from_path(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    // CFG-004: search order
    #[test]
    fn test_config_search_paths() {
        let paths = Config::search_paths();
        assert!(!paths.is_empty());
        assert_eq!(paths[0], PathBuf::from("ocrsegment.toml"));
        if paths.len() > 1 {
            assert!(paths[1].ends_with("ocrsegment/config.toml"));
        }
    }

    // CFG-005: TOML parse (partial section keeps other defaults)
    #[test]
    fn test_config_toml_parse_partial() {
        let toml = r#"
[ocropy]
additional_args = "--threshold 0.5  --zoom 0.5"
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.ocropy.python, "python2");
        assert_eq!(
            config.ocropy.extra_args().unwrap(),
            vec!["--threshold", "0.5", "--zoom", "0.5"]
        );
        assert_eq!(config.kraken, KrakenConfig::default());
    }

    // CFG-006: TOML parse (empty file)
    #[test]
    fn test_config_toml_parse_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    // CFG-007: TOML parse (invalid format)
    #[test]
    fn test_config_toml_parse_invalid() {
        let result = Config::from_toml("this is not valid toml [[[");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    // CFG-008: quoted arguments stay whole
    #[test]
    fn test_config_quoted_args() {
        let kraken = KrakenConfig {
            environment: String::new(),
            additional_args: r#"--model "/models/my model.mlmodel""#.to_string(),
        };
        assert_eq!(
            kraken.extra_args().unwrap(),
            vec!["--model", "/models/my model.mlmodel"]
        );

        let config = Config::from_toml(
            r#"
[ocropy]
python = "'/opt/my venv/bin/python2'"
"#,
        )
        .unwrap();
        assert_eq!(
            config.ocropy.python_command().unwrap(),
            vec!["/opt/my venv/bin/python2"]
        );
    }

    // CFG-009: unbalanced quotes are rejected at load time
    #[test]
    fn test_config_unbalanced_quotes() {
        let kraken = KrakenConfig {
            environment: "conda run -n 'kraken".to_string(),
            additional_args: String::new(),
        };
        assert!(matches!(
            kraken.environment_prefix(),
            Err(ConfigError::InvalidArgs { field: "kraken.environment", .. })
        ));

        let result = Config::from_toml(
            r#"
[ocropy]
additional_args = "--threshold \"0.5"
"#,
        );
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidArgs { .. }));
        assert!(err.to_string().contains("ocropy.additional_args"));
    }

    #[test]
    fn test_empty_prefixes() {
        let config = Config::default();
        assert_eq!(config.ocropy.python_command().unwrap(), vec!["python2"]);
        assert!(config.kraken.environment_prefix().unwrap().is_empty());
        assert!(config.kraken.extra_args().unwrap().is_empty());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotFound(PathBuf::from("/test/path"));
        assert!(err.to_string().contains("Config file not found"));
    }
}
