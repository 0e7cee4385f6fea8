use dapp_connector::{
    types::error_codes::{ApiErrorCode, ErrorObject},
    ConnectorError,
};
use dapp_connector_page::PageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Extension runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("Unexpected reply from the background: {0}")]
    UnexpectedReply(&'static str),
    #[error("Favicon request failed with status {0}")]
    FaviconStatus(u16),
    #[error("Favicon request timed out")]
    FaviconTimeout,
    #[error("Favicon larger than {0} bytes")]
    FaviconTooLarge(usize),

    // Wrapped errors
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    #[error(transparent)]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl From<RelayError> for ErrorObject {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::Connector(e) => e.into(),
            RelayError::Page(e) => e.into(),
            // The page only learns that the background could not be reached.
            _ => ErrorObject::api(
                ApiErrorCode::InternalError,
                "Could not reach the wallet background",
            ),
        }
    }
}
