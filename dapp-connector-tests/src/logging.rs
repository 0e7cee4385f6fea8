//! Tracing setup for the test runner.

use std::{ffi::OsStr, path::Path};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use crate::{config::LoggingConfig, error::ConnectorTestError};

/// Keeps the file writers flushing until dropped.
#[derive(Default)]
pub struct LoggingGuards {
    _all_layer_guard: Option<WorkerGuard>,
    _connector_layer_guard: Option<WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuards, ConnectorTestError> {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(our_targets_filter(config.stdout_log_level));

    let logging_guards = match &config.log_files {
        Some(file_config) => {
            let (all_logs_dir, all_logs_file) = get_paths(&file_config.all_log_file)?;
            let (connector_logs_dir, connector_logs_file) =
                get_paths(&file_config.connector_log_file)?;

            let all_appender = tracing_appender::rolling::hourly(all_logs_dir, all_logs_file);
            let (non_blocking, _all_layer_guard) = tracing_appender::non_blocking(all_appender);
            let all_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking);

            let connector_appender =
                tracing_appender::rolling::hourly(connector_logs_dir, connector_logs_file);
            let (non_blocking, _connector_layer_guard) =
                tracing_appender::non_blocking(connector_appender);
            let connector_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(our_targets_filter(Level::TRACE));

            tracing_subscriber::registry()
                .with(stdout_layer)
                .with(connector_layer)
                .with(all_layer)
                .init();

            LoggingGuards {
                _all_layer_guard: Some(_all_layer_guard),
                _connector_layer_guard: Some(_connector_layer_guard),
            }
        }
        None => {
            tracing_subscriber::registry().with(stdout_layer).init();
            LoggingGuards::default()
        }
    };

    Ok(logging_guards)
}

/// Split a log file path into the directory and file name tracing_appender
/// wants.
fn get_paths(path: &Path) -> Result<(&Path, &OsStr), ConnectorTestError> {
    let dir = path
        .parent()
        .ok_or_else(|| ConnectorTestError::InvalidLogFilePath(path.into()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| ConnectorTestError::InvalidLogFilePath(path.into()))?;
    Ok((dir, file_name))
}

/// Events from the connector crates.
fn our_targets_filter(level: Level) -> Targets {
    Targets::new()
        .with_target("dapp_connector", level)
        .with_target("dapp_connector_page", level)
        .with_target("dapp_connector_relay", level)
        .with_target("dapp_connector_broker", level)
        .with_target("dapp_connector_popup", level)
        .with_target("dapp_connector_consent_hashmap", level)
        .with_target("dapp_connector_consent_json", level)
        .with_target("dapp_connector_tests", level)
}
