use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::types::{
    error_codes::{DataSignErrorCode, ErrorObject, TxSendErrorCode, TxSignErrorCode},
    ids::TabId,
    protocol::Protocol,
    rpc::Uid,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SigningKind {
    Tx,
    TxInput,
    Data,
    Submit,
}

impl SigningKind {
    /// Error returned to the page when the user declines.
    pub fn declined(self) -> ErrorObject {
        match self {
            Self::Tx | Self::TxInput => {
                ErrorObject::tx_sign(TxSignErrorCode::UserDeclined, "User declined to sign")
            }
            Self::Data => {
                ErrorObject::data_sign(DataSignErrorCode::UserDeclined, "User declined to sign")
            }
            Self::Submit => {
                ErrorObject::tx_send(TxSendErrorCode::Refused, "User declined to submit")
            }
        }
    }
}

/// A request waiting for a human decision. Lives only as long as the popup
/// reviewing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequest {
    pub uid: Uid,
    pub tab_id: TabId,
    pub origin: String,
    pub protocol: Protocol,
    pub kind: SigningKind,
    pub payload: Value,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Confirmed,
    Rejected,
}

/// A decision keyed by the request it answers. Consumed exactly once.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDecision {
    pub uid: Uid,
    pub tab_id: TabId,
    pub decision: Decision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declined_codes_depend_on_kind() {
        assert_eq!(SigningKind::Tx.declined().code, 2);
        assert_eq!(SigningKind::TxInput.declined().code, 2);
        assert_eq!(SigningKind::Data.declined().code, 3);
        assert_eq!(SigningKind::Submit.declined().code, 1);
    }
}
