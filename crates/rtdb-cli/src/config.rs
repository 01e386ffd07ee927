//! Configuration file handling for rtdb-cli

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

const DEFAULT_SERVER: &str = "http://localhost:9000";

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default server URL
    pub server: Option<String>,
    /// Database secret appended as the `auth` parameter
    pub auth: Option<String>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("rtdb-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        server: Option<&str>,
        auth: Option<&str>,
        output: Option<OutputFormat>,
        no_color: bool,
    ) -> MergedConfig {
        MergedConfig {
            server: server
                .map(String::from)
                .or_else(|| self.server.clone())
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            auth: auth.map(String::from).or_else(|| self.auth.clone()),
            output: output
                .or_else(|| {
                    self.output
                        .as_deref()
                        .and_then(|name| OutputFormat::from_str(name, true).ok())
                })
                .unwrap_or_default(),
            no_color: no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub server: String,
    pub auth: Option<String>,
    pub output: OutputFormat,
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args_override_file() {
        let config: Config = toml::from_str(
            r#"
            server = "https://file.example"
            auth = "file-secret"
            output = "json"
            no_color = true
            "#,
        )
        .unwrap();

        let merged = config.merge_with_args(Some("https://arg.example"), None, None, false);
        assert_eq!(merged.server, "https://arg.example");
        assert_eq!(merged.auth.as_deref(), Some("file-secret"));
        assert_eq!(merged.output, OutputFormat::Json);
        assert!(merged.no_color);
    }

    #[test]
    fn test_defaults() {
        let merged = Config::default().merge_with_args(None, None, None, false);
        assert_eq!(merged.server, DEFAULT_SERVER);
        assert_eq!(merged.auth, None);
        assert_eq!(merged.output, OutputFormat::Table);
        assert!(!merged.no_color);
    }
}
