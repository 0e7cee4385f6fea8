use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr, time::Duration};

use crate::BrokerError;

/// Broker configuration with all fields ready to use.
#[derive(Debug, Clone)]
pub struct Config {
    pub confirmation_window: WindowGeometry,
    /// How long a signing request may wait for a decision. `None` waits
    /// until the window or tab goes away.
    pub decision_timeout: Option<Duration>,
    /// Whether `submitTx` asks the user before submitting.
    pub confirm_submit: bool,
}

impl Config {
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self, BrokerError> {
        let config_string = std::fs::read_to_string(&config_path)?;
        let config_file = ConfigFile::from_str(&config_string)?;
        Self::from_config_file(config_file)
    }

    pub fn from_config_file(config: ConfigFile) -> Result<Self, BrokerError> {
        if config.confirmation_window.width == 0 || config.confirmation_window.height == 0 {
            return Err(BrokerError::InvalidConfig(
                "confirmation_window must have a positive size".to_string(),
            ));
        }
        if config.decision_timeout.map_or(false, |t| t.is_zero()) {
            return Err(BrokerError::InvalidConfig(
                "decision_timeout must be positive".to_string(),
            ));
        }

        Ok(Self {
            confirmation_window: config.confirmation_window,
            decision_timeout: config.decision_timeout,
            confirm_submit: config.confirm_submit,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            confirmation_window: WindowGeometry {
                width: 500,
                height: 700,
            },
            decision_timeout: None,
            confirm_submit: true,
        }
    }
}

/// Size of a confirmation popup, in pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct WindowGeometry {
    pub width: u32,
    pub height: u32,
}

/// Broker configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
#[non_exhaustive]
pub struct ConfigFile {
    pub confirmation_window: WindowGeometry,
    #[serde(default, with = "humantime_serde")]
    pub decision_timeout: Option<Duration>,
    #[serde(default = "confirm_submit_default")]
    pub confirm_submit: bool,
}

fn confirm_submit_default() -> bool {
    true
}

impl FromStr for ConfigFile {
    type Err = BrokerError;

    fn from_str(config_string: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(config_string)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_str() {
        let config_str = r#"
            decision_timeout = "5m"
            confirm_submit = false

            [confirmation_window]
            width = 400
            height = 600
        "#;

        // Destructure so the test breaks when fields are added
        let ConfigFile {
            confirmation_window,
            decision_timeout,
            confirm_submit,
        } = ConfigFile::from_str(config_str).unwrap();

        assert_eq!(
            confirmation_window,
            WindowGeometry {
                width: 400,
                height: 600
            }
        );
        assert_eq!(decision_timeout, Some(Duration::from_secs(300)));
        assert!(!confirm_submit);
    }

    #[test]
    fn optional_fields_default() {
        let config_str = r#"
            [confirmation_window]
            width = 400
            height = 600
        "#;
        let config = Config::from_config_file(ConfigFile::from_str(config_str).unwrap()).unwrap();
        assert_eq!(config.decision_timeout, None);
        assert!(config.confirm_submit);
    }

    #[test]
    fn empty_window_is_rejected() {
        let config_str = r#"
            [confirmation_window]
            width = 0
            height = 600
        "#;
        let config_file = ConfigFile::from_str(config_str).unwrap();
        assert!(matches!(
            Config::from_config_file(config_file),
            Err(BrokerError::InvalidConfig(_))
        ));
    }
}
