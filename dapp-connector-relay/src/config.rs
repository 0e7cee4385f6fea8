use dapp_connector::{
    constants::DEFAULT_WALLET_NAME,
    types::{injection::BuildFlavor, protocol::Protocol},
};
use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr, time::Duration};

use crate::RelayError;

/// Relay configuration with all fields validated.
#[derive(Debug, Clone)]
pub struct Config {
    pub flavor: BuildFlavor,
    pub wallet_name: String,
    pub wallet_icon: String,
    pub heartbeat_period: Duration,
    /// Missed heartbeats after which the page is told it was disconnected.
    pub disconnect_threshold: u32,
    /// Missed heartbeats after which every outstanding call is failed.
    pub reject_threshold: u32,
    pub heartbeat_protocols: Vec<Protocol>,
    pub favicon_timeout: Duration,
}

impl Config {
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let config_string = std::fs::read_to_string(&config_path)?;
        let config_file = ConfigFile::from_str(&config_string)?;
        Self::from_config_file(config_file)
    }

    pub fn from_config_file(config: ConfigFile) -> Result<Self, RelayError> {
        if config.disconnect_threshold == 0 {
            return Err(RelayError::InvalidConfig(
                "disconnect_threshold must be positive".to_string(),
            ));
        }
        if config.reject_threshold <= config.disconnect_threshold {
            return Err(RelayError::InvalidConfig(format!(
                "reject_threshold ({}) must exceed disconnect_threshold ({})",
                config.reject_threshold, config.disconnect_threshold
            )));
        }
        if config.heartbeat_period.is_zero() {
            return Err(RelayError::InvalidConfig(
                "heartbeat_period must be positive".to_string(),
            ));
        }

        Ok(Self {
            flavor: config.flavor,
            wallet_name: config
                .wallet_name
                .unwrap_or_else(|| DEFAULT_WALLET_NAME.to_string()),
            wallet_icon: config.wallet_icon.unwrap_or_default(),
            heartbeat_period: config.heartbeat_period,
            disconnect_threshold: config.disconnect_threshold,
            reject_threshold: config.reject_threshold,
            heartbeat_protocols: config.heartbeat_protocols,
            favicon_timeout: config.favicon_timeout,
        })
    }
}

/// Relay configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
#[non_exhaustive]
pub struct ConfigFile {
    pub flavor: BuildFlavor,
    pub wallet_name: Option<String>,
    pub wallet_icon: Option<String>,
    #[serde(with = "humantime_serde")]
    pub heartbeat_period: Duration,
    pub disconnect_threshold: u32,
    pub reject_threshold: u32,
    #[serde(default)]
    pub heartbeat_protocols: Vec<Protocol>,
    #[serde(with = "humantime_serde")]
    pub favicon_timeout: Duration,
}

impl FromStr for ConfigFile {
    type Err = RelayError;

    fn from_str(config_string: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(config_string)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        flavor = "nightly"
        wallet_name = "yoroi"
        heartbeat_period = "1s"
        disconnect_threshold = 15
        reject_threshold = 30
        heartbeat_protocols = ["ergo"]
        favicon_timeout = "2s 500ms"
    "#;

    #[test]
    fn config_from_str() {
        // Destructure so the test breaks when fields are added
        let ConfigFile {
            flavor,
            wallet_name,
            wallet_icon,
            heartbeat_period,
            disconnect_threshold,
            reject_threshold,
            heartbeat_protocols,
            favicon_timeout,
        } = ConfigFile::from_str(CONFIG).unwrap();

        assert_eq!(flavor, BuildFlavor::Nightly);
        assert_eq!(wallet_name, Some("yoroi".to_string()));
        assert_eq!(wallet_icon, None);
        assert_eq!(heartbeat_period, Duration::from_secs(1));
        assert_eq!(disconnect_threshold, 15);
        assert_eq!(reject_threshold, 30);
        assert_eq!(heartbeat_protocols, vec![Protocol::Ergo]);
        assert_eq!(favicon_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn thresholds_are_validated() {
        let config_file =
            ConfigFile::from_str(&CONFIG.replace("reject_threshold = 30", "reject_threshold = 15"))
                .unwrap();
        assert!(matches!(
            Config::from_config_file(config_file),
            Err(RelayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let with_extra = format!("{CONFIG}\nretry_forever = true\n");
        assert!(ConfigFile::from_str(&with_extra).is_err());
    }

    #[test]
    fn wallet_name_defaults() {
        let config_file = ConfigFile::from_str(&CONFIG.replace("wallet_name = \"yoroi\"", ""))
            .unwrap();
        let config = Config::from_config_file(config_file).unwrap();
        assert_eq!(config.wallet_name, DEFAULT_WALLET_NAME);
    }
}
