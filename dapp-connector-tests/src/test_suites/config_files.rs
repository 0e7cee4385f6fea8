//! Config file tests that depend on files to exist at specific paths.
//! If the paths listed in these tests change, the tests will fail.

use colored::Colorize;
use dapp_connector::types::{injection::BuildFlavor, protocol::Protocol};
use dapp_connector_broker::{BrokerError, Config as BrokerConfig, ConfigFile as BrokerConfigFile};
use dapp_connector_consent_json::Config as JsonConfig;
use dapp_connector_relay::{Config as RelayConfig, ConfigFile as RelayConfigFile, RelayError};
use std::{str::FromStr, time::Duration};
use tracing::Level;

use crate::{
    config::{Config, ConfigFile},
    error::Result,
    run_parallel,
    utils::{report_test_results, TestResult},
};

const RELAY_CONFIG: &str = "../dev/local/Relay.toml";
const BROKER_CONFIG: &str = "../dev/local/Broker.toml";
const CONSENT_CONFIG: &str = "../dev/local/Consent.toml";
const RUNNER_CONFIG: &str = "../dev/local/TestRunner.toml";

pub async fn run_tests(config: &Config) -> Result<Vec<TestResult>> {
    println!("{}", "Running config file tests".cyan());

    let results = run_parallel!(
        config.clone(),
        relay_config_file_works(),
        relay_thresholds_must_be_ordered(),
        broker_config_file_works(),
        broker_rejects_empty_window(),
        consent_config_file_works(),
        runner_config_file_works(),
    )?;

    println!("config file tests: {}", report_test_results(&results));

    Ok(results)
}

/// Config paths are relative to the workspace root, but cargo runs tests
/// from the crate directory.
fn from_crate_dir(path: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(path)
}

async fn relay_config_file_works() -> Result<()> {
    let config = RelayConfig::from_file(from_crate_dir(RELAY_CONFIG))?;
    assert_eq!(config.flavor, BuildFlavor::Prod);
    assert_eq!(config.heartbeat_protocols, vec![Protocol::Ergo]);
    assert!(config.reject_threshold > config.disconnect_threshold);
    Ok(())
}

async fn relay_thresholds_must_be_ordered() -> Result<()> {
    let config_file = RelayConfigFile::from_str(
        r#"
        flavor = "dev"
        heartbeat_period = "1s"
        disconnect_threshold = 10
        reject_threshold = 10
        favicon_timeout = "1s"
        "#,
    )?;
    assert!(matches!(
        RelayConfig::from_config_file(config_file),
        Err(RelayError::InvalidConfig(_))
    ));
    Ok(())
}

async fn broker_config_file_works() -> Result<()> {
    let config = BrokerConfig::from_file(from_crate_dir(BROKER_CONFIG))?;
    assert!(config.confirm_submit);
    assert_eq!(config.decision_timeout, Some(Duration::from_secs(600)));
    Ok(())
}

async fn broker_rejects_empty_window() -> Result<()> {
    let config_file = BrokerConfigFile::from_str(
        r#"
        [confirmation_window]
        width = 0
        height = 700
        "#,
    )?;
    assert!(matches!(
        BrokerConfig::from_config_file(config_file),
        Err(BrokerError::InvalidConfig(_))
    ));
    Ok(())
}

async fn consent_config_file_works() -> Result<()> {
    let config = JsonConfig::from_file(from_crate_dir(CONSENT_CONFIG))?;
    assert_eq!(
        config.path.file_name().and_then(|name| name.to_str()),
        Some("consent.json")
    );
    Ok(())
}

async fn runner_config_file_works() -> Result<()> {
    let config_file = ConfigFile::from_file(from_crate_dir(RUNNER_CONFIG))?;
    assert_eq!(config_file.logging.stdout_log_level, Level::INFO);
    assert!(config_file.logging.log_files.is_some());
    Ok(())
}
