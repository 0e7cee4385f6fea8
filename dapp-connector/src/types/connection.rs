//! Per-origin consent records and their state machine.

use serde::{Deserialize, Serialize};
use strum::Display;
use time::OffsetDateTime;

use crate::{
    types::{ids::WalletId, protocol::Protocol},
    ConnectorError,
};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    PendingApproval,
    Connected,
}

/// Identification a page may request on connect (`requestIdentification`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAuth {
    pub wallet_id: WalletId,
    pub pubkey: String,
}

/// Inputs to [`ConnectionRecord::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Requested,
    Approved {
        wallet_id: WalletId,
        auth: Option<WalletAuth>,
    },
    /// The user rejected the request or closed the popup.
    Rejected,
    /// The user revoked access or the wallet disconnected the origin.
    Revoked,
}

impl ConnectionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Approved { .. } => "approved",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
        }
    }
}

/// Consent for one `(origin, protocol)` pair. A record persisted in the
/// [`Connected`](ConnectionState::Connected) state is a standing grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub origin: String,
    pub protocol: Protocol,
    pub state: ConnectionState,
    pub wallet_id: Option<WalletId>,
    pub auth: Option<WalletAuth>,
    pub updated_at: OffsetDateTime,
}

impl ConnectionRecord {
    pub fn new(origin: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            origin: origin.into(),
            protocol,
            state: ConnectionState::Disconnected,
            wallet_id: None,
            auth: None,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Move the record along one legal edge. An illegal event leaves the
    /// record untouched.
    pub fn apply(&mut self, event: ConnectionEvent) -> Result<ConnectionState, ConnectorError> {
        use ConnectionState::*;

        let name = event.name();
        match (self.state, event) {
            (Disconnected, ConnectionEvent::Requested) => {
                self.state = PendingApproval;
            }
            (PendingApproval, ConnectionEvent::Approved { wallet_id, auth }) => {
                self.state = Connected;
                self.wallet_id = Some(wallet_id);
                self.auth = auth;
            }
            (PendingApproval, ConnectionEvent::Rejected) | (Connected, ConnectionEvent::Revoked) => {
                self.state = Disconnected;
                self.wallet_id = None;
                self.auth = None;
            }
            (from, _) => {
                return Err(ConnectorError::IllegalTransition { from, event: name });
            }
        }
        self.updated_at = OffsetDateTime::now_utc();
        Ok(self.state)
    }
}
