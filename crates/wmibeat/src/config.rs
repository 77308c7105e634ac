//! Configuration loading and types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wmibeat_core::QueryConfig;

/// Top-level configuration for the wmibeat daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Queries to poll
    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;
        Self::parse(&content).map_err(|e| eyre::eyre!("invalid config {}: {e}", path.display()))
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not a valid configuration
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default() -> eyre::Result<Self> {
        // Check environment variable
        if let Ok(path) = std::env::var("WMIBEAT_CONFIG") {
            return Self::load(Path::new(&path));
        }

        // Try common paths
        let paths = [
            PathBuf::from("wmibeat.toml"),
            PathBuf::from("/etc/wmibeat/wmibeat.toml"),
            dirs::config_dir()
                .map(|p| p.join("wmibeat/wmibeat.toml"))
                .unwrap_or_default(),
        ];

        for path in paths {
            if path.is_file() {
                return Self::load(&path);
            }
        }

        // Return default config if no file found
        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wmibeat_core::FieldSpec;

    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            [logging]
            level = "debug"
            format = "json"

            [[queries]]
            period = "10s"
            class = "Win32_OperatingSystem"
            fields = ["FreePhysicalMemory", { name = "NumberOfProcesses", int = true }]

            [[queries]]
            class = "Win32_LogicalDisk"
            fields = ["Name", "FreeSpace"]
            whereclause = "DriveType = 3"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.queries.len(), 2);
        assert_eq!(config.queries[0].period, Duration::from_secs(10));
        assert_eq!(
            config.queries[0].fields[1],
            FieldSpec::integer("NumberOfProcesses")
        );
        assert_eq!(config.queries[1].period, Duration::from_secs(1));
        assert_eq!(config.queries[1].where_clause, "DriveType = 3");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.queries.is_empty());
    }

    #[test]
    fn test_query_without_class_rejected() {
        let result = Config::parse(
            r#"
            [[queries]]
            fields = ["Name"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/wmibeat.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
