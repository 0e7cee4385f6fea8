use dapp_connector::types::ids::WindowId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PopupError {
    #[error("Broker sent an unexpected reply to {0}")]
    UnexpectedReply(&'static str),
    #[error("A connect approval needs a wallet")]
    NoWalletSelected,
    #[error("Could not reach the broker: {0}")]
    BrokerUnreachable(String),
    #[error("Could not close window {0}")]
    CloseFailed(WindowId),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}
