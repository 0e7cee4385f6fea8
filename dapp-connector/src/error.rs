use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::types::{
    connection::ConnectionState,
    error_codes::{ApiErrorCode, ErrorObject},
    protocol::Protocol,
};

#[derive(Debug, Error)]
pub enum ConnectorError {
    // Channel errors
    #[error("Invalid message")]
    InvalidMessage,
    #[error("No message received")]
    NoMessageReceived,
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    // Request validation errors
    #[error("Unknown function {function} for protocol {protocol}")]
    UnknownFunction { protocol: Protocol, function: String },
    #[error("{function} expects between {min} and {max} parameters, got {actual}")]
    InvalidParameterCount {
        function: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // State machine errors
    #[error("Illegal connection transition from {from} on {event}")]
    IllegalTransition {
        from: ConnectionState,
        event: &'static str,
    },

    // Wrapped errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error("tokio Sender error: {}", .0)]
    TokioSender(String),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl<T> From<mpsc::error::SendError<T>> for ConnectorError {
    fn from(error: mpsc::error::SendError<T>) -> Self {
        Self::TokioSender(error.to_string())
    }
}

impl<T> From<broadcast::error::SendError<T>> for ConnectorError {
    fn from(error: broadcast::error::SendError<T>) -> Self {
        Self::TokioSender(error.to_string())
    }
}

impl From<ConnectorError> for ErrorObject {
    fn from(error: ConnectorError) -> Self {
        match error {
            // Errors that are safe to return to the page
            ConnectorError::InvalidMessage
            | ConnectorError::UnknownMessageType(_)
            | ConnectorError::UnknownFunction { .. }
            | ConnectorError::InvalidParameterCount { .. }
            | ConnectorError::InvalidParameter(_) => {
                ErrorObject::api(ApiErrorCode::InvalidRequest, error.to_string())
            }

            // Errors that the page should not see
            ConnectorError::NoMessageReceived
            | ConnectorError::IllegalTransition { .. }
            | ConnectorError::Io(_)
            | ConnectorError::SerdeJson(_)
            | ConnectorError::TokioSender(_)
            | ConnectorError::Toml(_) => {
                ErrorObject::api(ApiErrorCode::InternalError, "Internal error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_invalid_request() {
        let error: ErrorObject = ConnectorError::UnknownFunction {
            protocol: Protocol::Ergo,
            function: "get_network_id".to_string(),
        }
        .into();

        assert_eq!(error.code, ApiErrorCode::InvalidRequest.code());
        assert!(error.info.contains("get_network_id"));
    }

    #[test]
    fn internal_errors_are_sanitized() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "/secret/path missing");
        let error: ErrorObject = ConnectorError::from(io).into();

        assert_eq!(error.code, ApiErrorCode::InternalError.code());
        assert!(!error.info.contains("secret"));
    }
}
