//! CIP-30 aligned error taxonomy.
//!
//! Errors never cross a context boundary as panics or Rust errors. They are
//! serialized into the `err` field of an [`RpcResponse`](super::rpc::RpcResponse)
//! as an [`ErrorObject`] and only turned back into a failed call by the page
//! realm.

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// General API errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[repr(i32)]
pub enum ApiErrorCode {
    InvalidRequest = -1,
    InternalError = -2,
    Refused = -3,
    AccountChange = -4,
}

/// Errors from `signData`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[repr(i32)]
pub enum DataSignErrorCode {
    ProofGeneration = 1,
    AddressNotPk = 2,
    UserDeclined = 3,
    InvalidFormat = 4,
}

/// Errors from `submitTx`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[repr(i32)]
pub enum TxSendErrorCode {
    Refused = 1,
    Failure = 2,
}

/// Errors from `signTx`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
#[repr(i32)]
pub enum TxSignErrorCode {
    ProofGeneration = 1,
    UserDeclined = 2,
}

impl ApiErrorCode {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl DataSignErrorCode {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl TxSendErrorCode {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl TxSignErrorCode {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// The `{code, info}` shape a page sees when a call fails. Pagination
/// overflows additionally carry `maxSize`, the number of pages available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("error {code}: {info}")]
pub struct ErrorObject {
    pub code: i32,
    pub info: String,
    #[serde(rename = "maxSize", default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
}

impl ErrorObject {
    fn with_code(code: i32, info: impl Into<String>) -> Self {
        Self {
            code,
            info: info.into(),
            max_size: None,
        }
    }

    pub fn api(code: ApiErrorCode, info: impl Into<String>) -> Self {
        Self::with_code(code.code(), info)
    }

    pub fn data_sign(code: DataSignErrorCode, info: impl Into<String>) -> Self {
        Self::with_code(code.code(), info)
    }

    pub fn tx_send(code: TxSendErrorCode, info: impl Into<String>) -> Self {
        Self::with_code(code.code(), info)
    }

    pub fn tx_sign(code: TxSignErrorCode, info: impl Into<String>) -> Self {
        Self::with_code(code.code(), info)
    }

    /// A page or limit outside of the available range.
    pub fn paginate(max_size: u64) -> Self {
        Self {
            code: ApiErrorCode::InvalidRequest.code(),
            info: "Pagination out of range".to_string(),
            max_size: Some(max_size),
        }
    }

    pub fn is_api(&self, code: ApiErrorCode) -> bool {
        self.code == code.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codes_match_cip30() {
        assert_eq!(ApiErrorCode::InvalidRequest.code(), -1);
        assert_eq!(ApiErrorCode::AccountChange.code(), -4);
        assert_eq!(DataSignErrorCode::UserDeclined.code(), 3);
        assert_eq!(TxSendErrorCode::Failure.code(), 2);
        assert_eq!(TxSignErrorCode::UserDeclined.code(), 2);
    }

    #[test]
    fn error_object_shape() {
        let refused = ErrorObject::api(ApiErrorCode::Refused, "user declined access");
        assert_eq!(
            serde_json::to_value(&refused).unwrap(),
            json!({ "code": -3, "info": "user declined access" })
        );

        let paginate = ErrorObject::paginate(4);
        assert_eq!(serde_json::to_value(&paginate).unwrap()["maxSize"], json!(4));
    }
}
