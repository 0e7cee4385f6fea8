//! Config for the JSON consent store.

use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::JsonStoreError;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct Config {
    /// File holding the records. Created on first save.
    pub path: PathBuf,
}

impl Config {
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self, JsonStoreError> {
        let config_string = std::fs::read_to_string(&config_path)?;
        Self::from_str(&config_string)
    }
}

impl FromStr for Config {
    type Err = JsonStoreError;

    fn from_str(config_string: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(config_string)?)
    }
}
