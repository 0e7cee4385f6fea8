//! Interfaces to the parts of the extension the broker drives but does not
//! implement: the wallet's storage, the signer, browser windows and tabs.

use async_trait::async_trait;
use dapp_connector::types::{
    error_codes::ErrorObject,
    ids::{TabId, WalletId, WindowId},
    message::{BrokerEvent, PopupRoute},
    protocol::{Protocol, ReturnType},
    signing::SigningRequest,
};
use serde_json::Value;
use thiserror::Error;

use crate::{config::WindowGeometry, BrokerError};

/// Whose data a call reads and how results should be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletScope {
    pub wallet_id: WalletId,
    pub protocol: Protocol,
    pub return_type: ReturnType,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Used,
    Unused,
    Reward,
    Change,
}

/// Arguments of `getUtxos`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoQuery {
    /// Minimum value the returned set must cover, if any.
    pub amount: Option<String>,
    pub token_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum WalletStoreError {
    #[error("Wallet {0} not found")]
    WalletNotFound(WalletId),
    #[error("Wallet store error: {0}")]
    Internal(String),
}

/// Read access to wallet state.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn network_id(&self, scope: &WalletScope) -> Result<Value, WalletStoreError>;

    async fn balance(&self, scope: &WalletScope, token_id: &str) -> Result<Value, WalletStoreError>;

    async fn addresses(
        &self,
        scope: &WalletScope,
        kind: AddressKind,
    ) -> Result<Vec<Value>, WalletStoreError>;

    /// `None` if the wallet cannot cover the requested amount.
    async fn utxos(
        &self,
        scope: &WalletScope,
        query: &UtxoQuery,
    ) -> Result<Option<Vec<Value>>, WalletStoreError>;

    async fn collateral(
        &self,
        scope: &WalletScope,
        required_amount: Option<&str>,
    ) -> Result<Value, WalletStoreError>;

    async fn stake_keys(
        &self,
        scope: &WalletScope,
        registered: bool,
    ) -> Result<Vec<Value>, WalletStoreError>;

    async fn drep_key(&self, scope: &WalletScope) -> Result<Value, WalletStoreError>;

    async fn nfts(&self, scope: &WalletScope) -> Result<Value, WalletStoreError>;

    /// Build an unsigned transaction from a dApp's description of it.
    async fn create_tx(&self, scope: &WalletScope, request: &Value)
        -> Result<Value, WalletStoreError>;

    /// Public key disclosed to origins that asked for identification.
    async fn auth_pubkey(&self, wallet_id: &WalletId) -> Result<String, WalletStoreError>;
}

/// Produces signatures for requests the user approved. Errors are CIP-30
/// error objects and reach the page unchanged.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, scope: &WalletScope, request: &SigningRequest)
        -> Result<Value, ErrorObject>;

    async fn submit(&self, scope: &WalletScope, tx: &Value) -> Result<Value, ErrorObject>;

    async fn sign_auth_payload(
        &self,
        scope: &WalletScope,
        payload: &str,
    ) -> Result<Value, ErrorObject>;

    async fn check_auth_payload(
        &self,
        scope: &WalletScope,
        payload: &str,
        signature: &str,
    ) -> Result<Value, ErrorObject>;
}

#[derive(Debug, Error)]
#[error("Window operation failed: {0}")]
pub struct WindowError(pub String);

/// `windows.create` / `windows.remove`.
///
/// The broker holds its state lock while calling [`WindowManager::open`], so
/// an implementation must not wait on the broker from inside `open`. Window
/// removal is reported back through
/// [`Broker::window_removed`](crate::Broker::window_removed).
#[async_trait]
pub trait WindowManager: Send + Sync {
    async fn open(&self, route: PopupRoute, geometry: WindowGeometry)
        -> Result<WindowId, WindowError>;

    async fn close(&self, window_id: WindowId) -> Result<(), WindowError>;
}

/// `tabs.sendMessage` towards a tab's relay.
#[async_trait]
pub trait TabPort: Send + Sync {
    async fn notify(&self, tab_id: TabId, event: BrokerEvent) -> Result<(), BrokerError>;
}
