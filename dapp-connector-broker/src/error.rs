use dapp_connector::{
    types::{
        error_codes::{ApiErrorCode, ErrorObject},
        ids::TabId,
        signing::SigningKind,
    },
    ConnectorError,
};
use thiserror::Error;

use crate::{ConsentStoreError, WalletStoreError, WindowError};

#[derive(Debug, Error)]
pub enum BrokerError {
    // Consent errors
    #[error("Origin is not connected")]
    NotConnected,
    #[error("User declined access")]
    AccessDeclined,
    #[error("No standing grant for a silent connect")]
    NoStandingGrant,
    #[error("Origin did not request identification")]
    IdentificationNotGranted,

    // Signing errors
    #[error("User declined the {0} request")]
    Declined(SigningKind),
    #[error("Signing request was abandoned")]
    SigningAbandoned,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Tab {0} is gone")]
    TabGone(TabId),
    #[error("Collaborator returned an error")]
    Api(ErrorObject),

    // Wrapped errors
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    ConsentStore(#[from] ConsentStoreError),
    #[error(transparent)]
    WalletStore(#[from] WalletStoreError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl From<BrokerError> for ErrorObject {
    fn from(error: BrokerError) -> Self {
        match error {
            // Errors that are safe to return to the page
            BrokerError::NotConnected
            | BrokerError::AccessDeclined
            | BrokerError::NoStandingGrant
            | BrokerError::IdentificationNotGranted => {
                ErrorObject::api(ApiErrorCode::Refused, error.to_string())
            }
            BrokerError::Declined(kind) => kind.declined(),
            BrokerError::Api(error) => error,
            BrokerError::Connector(error) => error.into(),

            // Errors that the page should not see
            BrokerError::SigningAbandoned
            | BrokerError::InvalidConfig(_)
            | BrokerError::TabGone(_)
            | BrokerError::ConsentStore(_)
            | BrokerError::WalletStore(_)
            | BrokerError::Window(_)
            | BrokerError::Io(_)
            | BrokerError::Toml(_) => {
                ErrorObject::api(ApiErrorCode::InternalError, "Internal error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_errors_are_refused() {
        let error: ErrorObject = BrokerError::NotConnected.into();
        assert!(error.is_api(ApiErrorCode::Refused));
    }

    #[test]
    fn declines_use_the_kind_specific_code() {
        let error: ErrorObject = BrokerError::Declined(SigningKind::Data).into();
        assert_eq!(error.code, 3);
    }

    #[test]
    fn internal_errors_are_sanitized() {
        let error: ErrorObject =
            BrokerError::from(WalletStoreError::Internal("db at /var/lib/wallet".into())).into();
        assert!(error.is_api(ApiErrorCode::InternalError));
        assert!(!error.info.contains("/var/lib"));
    }
}
