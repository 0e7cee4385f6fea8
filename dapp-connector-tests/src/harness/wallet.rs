//! A wallet with a fixed set of addresses and utxos, and a signer that
//! signs anything it is shown.

use async_trait::async_trait;
use dapp_connector::types::{
    error_codes::ErrorObject, ids::WalletId, signing::SigningRequest,
};
use dapp_connector_broker::{
    AddressKind, Signer, UtxoQuery, WalletScope, WalletStore, WalletStoreError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lovelace held by [`FixedWallet`].
pub const WALLET_BALANCE: u64 = 5_000_000;

#[derive(Debug, Default)]
pub struct FixedWallet;

impl FixedWallet {
    fn addresses_of(kind: AddressKind) -> Vec<Value> {
        let prefix = match kind {
            AddressKind::Used => "addr_used",
            AddressKind::Unused => "addr_unused",
            AddressKind::Reward => "stake",
            AddressKind::Change => "addr_change",
        };
        (0..4).map(|i| json!(format!("{prefix}{i}"))).collect()
    }
}

#[async_trait]
impl WalletStore for FixedWallet {
    async fn network_id(&self, _scope: &WalletScope) -> Result<Value, WalletStoreError> {
        Ok(json!(1))
    }

    async fn balance(&self, scope: &WalletScope, token_id: &str) -> Result<Value, WalletStoreError> {
        Ok(json!({
            "wallet": scope.wallet_id.as_str(),
            "token": token_id,
            "amount": WALLET_BALANCE.to_string(),
        }))
    }

    async fn addresses(
        &self,
        _scope: &WalletScope,
        kind: AddressKind,
    ) -> Result<Vec<Value>, WalletStoreError> {
        Ok(Self::addresses_of(kind))
    }

    async fn utxos(
        &self,
        _scope: &WalletScope,
        query: &UtxoQuery,
    ) -> Result<Option<Vec<Value>>, WalletStoreError> {
        let wanted = match &query.amount {
            Some(amount) => amount
                .parse::<u64>()
                .map_err(|e| WalletStoreError::Internal(e.to_string()))?,
            None => 0,
        };
        if wanted > WALLET_BALANCE {
            return Ok(None);
        }
        Ok(Some(vec![
            json!({ "utxo_id": "utxo-0", "amount": "3000000" }),
            json!({ "utxo_id": "utxo-1", "amount": "2000000" }),
        ]))
    }

    async fn collateral(
        &self,
        _scope: &WalletScope,
        _required_amount: Option<&str>,
    ) -> Result<Value, WalletStoreError> {
        Ok(json!([{ "utxo_id": "utxo-1", "amount": "2000000" }]))
    }

    async fn stake_keys(
        &self,
        _scope: &WalletScope,
        registered: bool,
    ) -> Result<Vec<Value>, WalletStoreError> {
        Ok(if registered {
            vec![json!("stake_key_0")]
        } else {
            vec![]
        })
    }

    async fn drep_key(&self, _scope: &WalletScope) -> Result<Value, WalletStoreError> {
        Ok(json!("drep_key"))
    }

    async fn nfts(&self, _scope: &WalletScope) -> Result<Value, WalletStoreError> {
        Ok(json!({}))
    }

    async fn create_tx(
        &self,
        _scope: &WalletScope,
        request: &Value,
    ) -> Result<Value, WalletStoreError> {
        Ok(json!({ "unsigned": request }))
    }

    async fn auth_pubkey(&self, wallet_id: &WalletId) -> Result<String, WalletStoreError> {
        Ok(format!("pubkey-{wallet_id}"))
    }
}

/// Signs everything and counts what it signed.
#[derive(Debug, Default)]
pub struct CountingSigner {
    signed: AtomicUsize,
    submitted: AtomicUsize,
}

impl CountingSigner {
    pub fn signed(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for CountingSigner {
    async fn sign(
        &self,
        _scope: &WalletScope,
        request: &SigningRequest,
    ) -> Result<Value, ErrorObject> {
        let _ = self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "signed": request.payload }))
    }

    async fn submit(&self, _scope: &WalletScope, _tx: &Value) -> Result<Value, ErrorObject> {
        let count = self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(json!(format!("txhash-{count}")))
    }

    async fn sign_auth_payload(
        &self,
        scope: &WalletScope,
        payload: &str,
    ) -> Result<Value, ErrorObject> {
        Ok(json!(format!("{}:{payload}", scope.wallet_id)))
    }

    async fn check_auth_payload(
        &self,
        scope: &WalletScope,
        payload: &str,
        signature: &str,
    ) -> Result<Value, ErrorObject> {
        Ok(json!(signature == format!("{}:{payload}", scope.wallet_id)))
    }
}
