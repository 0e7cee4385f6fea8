//! `window.ergoConnector` and the `window.ergo` API object.

use dapp_connector::{
    constants::ERGO_DEFAULT_TOKEN,
    types::{
        capability::{is_enabled_function, ErgoFunction},
        error_codes::{ApiErrorCode, ErrorObject},
        injection::BuildFlavor,
        message::ConnectRequest,
        protocol::Protocol,
        rpc::Paginate,
    },
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    cardano::{optional_param, paginate_param},
    realm::{Realm, Session},
};

#[derive(Debug, Clone)]
pub struct ErgoConnector {
    realm: Realm,
    flavor: BuildFlavor,
}

impl ErgoConnector {
    pub(crate) fn new(realm: Realm, flavor: BuildFlavor) -> Self {
        Self { realm, flavor }
    }

    pub fn flavor(&self) -> BuildFlavor {
        self.flavor
    }

    /// `ergo_request_read_access()`.
    pub async fn request_read_access(&self) -> Result<ErgoApi, ErrorObject> {
        let response = self
            .realm
            .connect(Protocol::Ergo, ConnectRequest::default())
            .await?;
        if !response.success {
            return Err(response
                .err
                .unwrap_or_else(|| ErrorObject::api(ApiErrorCode::Refused, "user reject")));
        }

        let session = self.realm.open_session(Protocol::Ergo).await;
        Ok(ErgoApi {
            realm: self.realm.clone(),
            session,
        })
    }

    /// `ergo_check_read_access()`.
    pub async fn check_read_access(&self) -> Result<bool, ErrorObject> {
        let enabled = self
            .realm
            .call(Protocol::Ergo, is_enabled_function(Protocol::Ergo), vec![], None)
            .await?;
        Ok(enabled.as_bool().unwrap_or(false))
    }
}

/// `window.ergo`.
#[derive(Clone)]
pub struct ErgoApi {
    realm: Realm,
    session: Arc<Session>,
}

impl std::fmt::Debug for ErgoApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErgoApi").field("realm", &self.realm).finish()
    }
}

impl ErgoApi {
    async fn call(&self, function: ErgoFunction, params: Vec<Value>) -> Result<Value, ErrorObject> {
        let _ = self.session.check().await?;
        self.realm
            .call(self.session.protocol(), function.to_string(), params, None)
            .await
    }

    pub async fn is_disconnected(&self) -> bool {
        self.session.is_disconnected().await
    }

    pub async fn on_disconnect(&self, callback: impl FnOnce() + Send + 'static) {
        self.session.on_disconnect(Box::new(callback)).await
    }

    pub async fn get_balance(&self, token_id: Option<&str>) -> Result<Value, ErrorObject> {
        let token_id = token_id.unwrap_or(ERGO_DEFAULT_TOKEN);
        self.call(ErgoFunction::GetBalance, vec![json!(token_id)])
            .await
    }

    pub async fn get_utxos(
        &self,
        amount: Option<&str>,
        token_id: Option<&str>,
        paginate: Option<Paginate>,
    ) -> Result<Value, ErrorObject> {
        let token_id = token_id.unwrap_or(ERGO_DEFAULT_TOKEN);
        self.call(
            ErgoFunction::GetUtxos,
            vec![
                optional_param(amount),
                json!(token_id),
                paginate_param(paginate),
            ],
        )
        .await
    }

    pub async fn get_used_addresses(
        &self,
        paginate: Option<Paginate>,
    ) -> Result<Value, ErrorObject> {
        self.call(ErgoFunction::GetUsedAddresses, vec![paginate_param(paginate)])
            .await
    }

    pub async fn get_unused_addresses(&self) -> Result<Value, ErrorObject> {
        self.call(ErgoFunction::GetUnusedAddresses, vec![]).await
    }

    pub async fn get_change_address(&self) -> Result<Value, ErrorObject> {
        self.call(ErgoFunction::GetChangeAddress, vec![]).await
    }

    pub async fn sign_tx(&self, tx: Value) -> Result<Value, ErrorObject> {
        self.call(ErgoFunction::SignTx, vec![tx]).await
    }

    pub async fn sign_tx_input(&self, tx: Value, index: u32) -> Result<Value, ErrorObject> {
        self.call(ErgoFunction::SignTxInput, vec![tx, json!(index)])
            .await
    }

    pub async fn submit_tx(&self, tx: Value) -> Result<Value, ErrorObject> {
        self.call(ErgoFunction::SubmitTx, vec![tx]).await
    }

    pub async fn ping(&self) -> Result<Value, ErrorObject> {
        self.call(ErgoFunction::Ping, vec![]).await
    }
}
