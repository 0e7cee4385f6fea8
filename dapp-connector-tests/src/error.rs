use dapp_connector::{types::error_codes::ErrorObject, ConnectorError};
use dapp_connector_broker::{BrokerError, ConsentStoreError};
use dapp_connector_consent_json::JsonStoreError;
use dapp_connector_page::PageError;
use dapp_connector_popup::PopupError;
use dapp_connector_relay::RelayError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectorTestError>;

#[derive(Debug, Error)]
pub enum ConnectorTestError {
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("Wallet global `{0}` was not installed")]
    MissingGlobal(&'static str),
    #[error("Invalid log file path: {0:?}")]
    InvalidLogFilePath(PathBuf),

    // Wrapped Errors
    #[error("Wallet API error: {0:?}")]
    Api(#[from] ErrorObject),
    #[error("ConnectorError: {0:?}")]
    Connector(#[from] ConnectorError),
    #[error("BrokerError: {0:?}")]
    Broker(#[from] BrokerError),
    #[error("ConsentStoreError: {0:?}")]
    ConsentStore(#[from] ConsentStoreError),
    #[error("JsonStoreError: {0:?}")]
    JsonStore(#[from] JsonStoreError),
    #[error("PageError: {0:?}")]
    Page(#[from] PageError),
    #[error("PopupError: {0:?}")]
    Popup(#[from] PopupError),
    #[error("RelayError: {0:?}")]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
