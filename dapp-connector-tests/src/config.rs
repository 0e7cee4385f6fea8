//! Test config types

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::Level;

use crate::{error::ConnectorTestError, Cli};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub filters: TestFilters,
    pub logging: LoggingConfig,
}

impl TryFrom<Cli> for Config {
    type Error = ConnectorTestError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let logging = match &cli.config {
            Some(path) => ConfigFile::from_file(path)?.logging,
            None => LoggingConfig::default(),
        };
        Ok(Self {
            filters: cli.filters.unwrap_or_default().into(),
            logging,
        })
    }
}

/// Runner configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
#[non_exhaustive]
pub struct ConfigFile {
    pub logging: LoggingConfig,
}

impl ConfigFile {
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self, ConnectorTestError> {
        let config_string = std::fs::read_to_string(&config_path)?;
        Self::from_str(&config_string)
    }
}

impl FromStr for ConfigFile {
    type Err = ConnectorTestError;

    fn from_str(config_string: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(config_string)?)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde_as(as = "DisplayFromStr")]
    pub stdout_log_level: Level,
    pub log_files: Option<LoggingFileConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout_log_level: Level::WARN,
            log_files: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct LoggingFileConfig {
    /// Events from the connector crates only.
    pub connector_log_file: PathBuf,
    /// Every event, including dependencies.
    pub all_log_file: PathBuf,
}

#[derive(Debug, Default, Clone)]
pub struct TestFilters {
    filters: Vec<String>,
}

impl From<Vec<String>> for TestFilters {
    fn from(filters: Vec<String>) -> Self {
        Self { filters }
    }
}

impl TestFilters {
    pub fn matches(&self, text: &str) -> bool {
        if self.filters.is_empty() {
            return true;
        }

        let text = text.to_lowercase();
        self.filters
            .iter()
            .any(|filter| text.contains(&filter.to_lowercase()))
    }
}
