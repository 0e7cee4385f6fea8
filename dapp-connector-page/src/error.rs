use dapp_connector::{
    types::error_codes::{ApiErrorCode, ErrorObject},
    ConnectorError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("Realm listener is not registered")]
    NotListening,
    #[error("Response channel closed before a reply arrived")]
    ResponseDropped,

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

impl From<PageError> for ErrorObject {
    fn from(error: PageError) -> Self {
        match error {
            PageError::Connector(e) => e.into(),
            PageError::NotListening | PageError::ResponseDropped => {
                ErrorObject::api(ApiErrorCode::InternalError, error.to_string())
            }
        }
    }
}
