use dapp_connector::types::{
    connection::WalletAuth,
    ids::{TabId, WalletId},
    rpc::RpcRequest,
    signing::{Decision, SigningKind, SigningRequest},
};
use serde_json::Value;

use crate::{broker::Broker, BrokerError, Config, Signer, WalletScope, WalletStore};

/// Everything a handler needs for one validated call.
pub(crate) struct Context {
    broker: Broker,
    pub tab_id: TabId,
    pub wallet_id: WalletId,
    /// Identification granted to the origin, if it asked for it.
    pub auth: Option<WalletAuth>,
    pub request: RpcRequest,
}

impl Context {
    pub(crate) fn new(
        broker: Broker,
        tab_id: TabId,
        wallet_id: WalletId,
        auth: Option<WalletAuth>,
        request: RpcRequest,
    ) -> Self {
        Self {
            broker,
            tab_id,
            wallet_id,
            auth,
            request,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.broker.inner.config
    }

    pub(crate) fn wallet(&self) -> &dyn WalletStore {
        self.broker.inner.collaborators.wallet.as_ref()
    }

    pub(crate) fn signer(&self) -> &dyn Signer {
        self.broker.inner.collaborators.signer.as_ref()
    }

    pub(crate) fn scope(&self) -> WalletScope {
        WalletScope {
            wallet_id: self.wallet_id.clone(),
            protocol: self.request.protocol,
            return_type: self.request.return_type.unwrap_or_default(),
        }
    }

    pub(crate) fn param(&self, index: usize) -> &Value {
        self.request.param(index)
    }

    /// Show `payload` to the user and wait for their decision. Returns the
    /// approved request, or [`BrokerError::Declined`].
    pub(crate) async fn approve(
        &self,
        kind: SigningKind,
        payload: Value,
    ) -> Result<SigningRequest, BrokerError> {
        let request = SigningRequest {
            uid: self.request.uid,
            tab_id: self.tab_id,
            origin: self.request.origin.clone(),
            protocol: self.request.protocol,
            kind,
            payload,
        };
        match self.broker.request_approval(request.clone()).await? {
            Decision::Confirmed => Ok(request),
            Decision::Rejected => Err(BrokerError::Declined(kind)),
        }
    }
}
