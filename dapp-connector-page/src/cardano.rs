//! `window.cardano.<name>` and the CIP-30 API object it hands out.

use dapp_connector::{
    constants::CARDANO_ALL_TOKENS,
    types::{
        capability::{is_enabled_function, CardanoFunction, Extension, WalletDescriptor},
        connection::WalletAuth,
        error_codes::{ApiErrorCode, ErrorObject},
        injection::BuildFlavor,
        message::ConnectRequest,
        protocol::{Protocol, ReturnType},
        rpc::Paginate,
    },
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::realm::{Realm, Session};

/// Options of `enable()`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EnableOptions {
    /// Ask for `auth {walletId, pubkey}` alongside access.
    pub request_identification: bool,
    /// Only succeed if the origin already holds a grant; never prompt.
    pub only_silent: bool,
}

pub(crate) fn paginate_param(paginate: Option<Paginate>) -> Value {
    match paginate {
        Some(paginate) => json!({ "page": paginate.page, "limit": paginate.limit }),
        None => Value::Null,
    }
}

pub(crate) fn optional_param(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| json!(value))
}

/// The wallet object a dApp discovers under `window.cardano`.
#[derive(Debug, Clone)]
pub struct CardanoWallet {
    realm: Realm,
    descriptor: WalletDescriptor,
    flavor: BuildFlavor,
}

impl CardanoWallet {
    pub(crate) fn new(realm: Realm, descriptor: WalletDescriptor, flavor: BuildFlavor) -> Self {
        Self {
            realm,
            descriptor,
            flavor,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn icon(&self) -> &str {
        &self.descriptor.icon
    }

    pub fn api_version(&self) -> &str {
        &self.descriptor.api_version
    }

    pub fn supported_extensions(&self) -> &[Extension] {
        &self.descriptor.supported_extensions
    }

    /// Build that installed this object.
    pub fn flavor(&self) -> BuildFlavor {
        self.flavor
    }

    /// Ask for access. Resolves to an API instance, or fails with `Refused`
    /// if the user declines.
    pub async fn enable(&self, options: EnableOptions) -> Result<CardanoApi, ErrorObject> {
        let response = self
            .realm
            .connect(
                Protocol::Cardano,
                ConnectRequest {
                    request_identification: options.request_identification,
                    only_silent: options.only_silent,
                },
            )
            .await?;

        if !response.success {
            return Err(response
                .err
                .unwrap_or_else(|| ErrorObject::api(ApiErrorCode::Refused, "user reject")));
        }

        let session = self.realm.open_session(Protocol::Cardano).await;
        Ok(CardanoApi {
            realm: self.realm.clone(),
            session,
            auth: response.auth,
        })
    }

    /// Asks the broker; another tab may have changed the grant.
    pub async fn is_enabled(&self) -> Result<bool, ErrorObject> {
        let enabled = self
            .realm
            .call(
                Protocol::Cardano,
                is_enabled_function(Protocol::Cardano),
                vec![],
                None,
            )
            .await?;
        Ok(enabled.as_bool().unwrap_or(false))
    }
}

/// CIP-30 API instance returned by [`CardanoWallet::enable`].
#[derive(Clone)]
pub struct CardanoApi {
    realm: Realm,
    session: Arc<Session>,
    auth: Option<WalletAuth>,
}

impl std::fmt::Debug for CardanoApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardanoApi")
            .field("realm", &self.realm)
            .field("auth", &self.auth)
            .finish()
    }
}

impl CardanoApi {
    async fn call(&self, function: CardanoFunction, params: Vec<Value>) -> Result<Value, ErrorObject> {
        let return_type = self.session.check().await?;
        self.realm
            .call(
                self.session.protocol(),
                function.to_string(),
                params,
                Some(return_type),
            )
            .await
    }

    pub async fn is_disconnected(&self) -> bool {
        self.session.is_disconnected().await
    }

    pub async fn get_network_id(&self) -> Result<Value, ErrorObject> {
        self.call(CardanoFunction::GetNetworkId, vec![]).await
    }

    /// Balance of `token_id`, or of every asset when `None`.
    pub async fn get_balance(&self, token_id: Option<&str>) -> Result<Value, ErrorObject> {
        let token_id = token_id.unwrap_or(CARDANO_ALL_TOKENS);
        self.call(CardanoFunction::GetBalance, vec![json!(token_id)])
            .await
    }

    pub async fn get_used_addresses(
        &self,
        paginate: Option<Paginate>,
    ) -> Result<Value, ErrorObject> {
        self.call(
            CardanoFunction::GetUsedAddresses,
            vec![paginate_param(paginate)],
        )
        .await
    }

    pub async fn get_unused_addresses(&self) -> Result<Value, ErrorObject> {
        self.call(CardanoFunction::GetUnusedAddresses, vec![]).await
    }

    pub async fn get_reward_addresses(&self) -> Result<Value, ErrorObject> {
        self.call(CardanoFunction::GetRewardAddresses, vec![]).await
    }

    pub async fn get_change_address(&self) -> Result<Value, ErrorObject> {
        self.call(CardanoFunction::GetChangeAddress, vec![]).await
    }

    pub async fn get_utxos(
        &self,
        amount: Option<&str>,
        paginate: Option<Paginate>,
    ) -> Result<Value, ErrorObject> {
        self.call(
            CardanoFunction::GetUtxos,
            vec![optional_param(amount), paginate_param(paginate)],
        )
        .await
    }

    pub async fn get_collateral(&self, required_amount: Option<&str>) -> Result<Value, ErrorObject> {
        self.call(
            CardanoFunction::GetCollateral,
            vec![optional_param(required_amount)],
        )
        .await
    }

    pub async fn submit_tx(&self, tx: &str) -> Result<Value, ErrorObject> {
        self.call(CardanoFunction::SubmitTx, vec![json!(tx)]).await
    }

    pub async fn sign_tx(&self, tx: &str, partial_sign: bool) -> Result<Value, ErrorObject> {
        self.call(
            CardanoFunction::SignTx,
            vec![json!({ "tx": tx, "partialSign": partial_sign })],
        )
        .await
    }

    pub async fn sign_data(&self, address: &str, payload: &str) -> Result<Value, ErrorObject> {
        self.call(
            CardanoFunction::SignData,
            vec![json!(address), json!(payload)],
        )
        .await
    }

    pub fn cip95(&self) -> Cip95Api<'_> {
        Cip95Api { api: self }
    }

    pub fn experimental(&self) -> ExperimentalApi<'_> {
        ExperimentalApi { api: self }
    }
}

/// `api.cip95`.
#[derive(Debug)]
pub struct Cip95Api<'a> {
    api: &'a CardanoApi,
}

impl Cip95Api<'_> {
    pub async fn get_pub_drep_key(&self) -> Result<Value, ErrorObject> {
        self.api.call(CardanoFunction::Cip95GetPubDrepKey, vec![]).await
    }

    pub async fn get_registered_pub_stake_keys(&self) -> Result<Value, ErrorObject> {
        self.api
            .call(CardanoFunction::Cip95GetRegisteredPubStakeKeys, vec![])
            .await
    }

    pub async fn get_unregistered_pub_stake_keys(&self) -> Result<Value, ErrorObject> {
        self.api
            .call(CardanoFunction::Cip95GetUnregisteredPubStakeKeys, vec![])
            .await
    }

    pub async fn sign_data(&self, address: &str, payload: &str) -> Result<Value, ErrorObject> {
        self.api
            .call(
                CardanoFunction::Cip95SignData,
                vec![json!(address), json!(payload)],
            )
            .await
    }
}

/// `api.experimental`.
#[derive(Debug)]
pub struct ExperimentalApi<'a> {
    api: &'a CardanoApi,
}

impl<'a> ExperimentalApi<'a> {
    /// Encoding used by every later call of this API instance.
    pub async fn set_return_type(&self, return_type: ReturnType) {
        self.api.session.set_return_type(return_type).await
    }

    /// Only available when access was requested with identification.
    pub fn auth(&self) -> Option<AuthApi<'a>> {
        self.api.auth.as_ref().map(|auth| AuthApi {
            api: self.api,
            auth,
        })
    }

    pub async fn create_tx(&self, request: Value) -> Result<Value, ErrorObject> {
        self.api.call(CardanoFunction::CreateTx, vec![request]).await
    }

    pub async fn list_nfts(&self) -> Result<Value, ErrorObject> {
        self.api.call(CardanoFunction::ListNfts, vec![]).await
    }

    /// Runs `callback` once, when the wallet disconnects this instance.
    pub async fn on_disconnect(&self, callback: impl FnOnce() + Send + 'static) {
        self.api.session.on_disconnect(Box::new(callback)).await
    }
}

/// `api.experimental.auth()`.
#[derive(Debug)]
pub struct AuthApi<'a> {
    api: &'a CardanoApi,
    auth: &'a WalletAuth,
}

impl AuthApi<'_> {
    pub fn wallet_id(&self) -> &str {
        self.auth.wallet_id.as_str()
    }

    pub fn wallet_pubkey(&self) -> &str {
        &self.auth.pubkey
    }

    pub async fn sign_hex_payload(&self, payload: &str) -> Result<Value, ErrorObject> {
        self.api
            .call(CardanoFunction::AuthSignHexPayload, vec![json!(payload)])
            .await
    }

    pub async fn check_hex_payload(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<Value, ErrorObject> {
        self.api
            .call(
                CardanoFunction::AuthCheckHexPayload,
                vec![json!(payload), json!(signature)],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapp_connector::{
        constants::{WALLET_ACCOUNT_CHANGED, WALLET_DISCONNECTED},
        infrastructure::channel::WindowBus,
        types::{
            injection::StaticDocument,
            message::{ConnectResponse, DisconnectReason, PageMessage},
            rpc::RpcResponse,
        },
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts every connect and answers every call with its own function
    /// name and return type.
    fn spawn_echo_relay(bus: WindowBus) {
        let mut listener = bus.subscribe();
        let _ = tokio::spawn(async move {
            while let Ok(message) = listener.receive().await {
                let reply = match message {
                    PageMessage::ConnectRequest { protocol, .. } => PageMessage::ConnectResponse {
                        protocol,
                        response: ConnectResponse::accepted(None),
                    },
                    PageMessage::RpcRequest(request) => {
                        PageMessage::RpcResponse(RpcResponse::ok(
                            request.uid,
                            json!([request.function, request.return_type, request.params]),
                        ))
                    }
                    _ => continue,
                };
                bus.post_message(&reply).unwrap();
            }
        });
    }

    async fn enabled_api() -> (CardanoApi, WindowBus) {
        let bus = WindowBus::new("https://dapp.example");
        let document = Arc::new(StaticDocument::new("https://dapp.example", None));
        let realm = Realm::new(bus.clone(), document);
        realm
            .install(WalletDescriptor::new("yoroi", ""), BuildFlavor::Prod)
            .await
            .unwrap();
        spawn_echo_relay(bus.clone());

        let wallet = realm.cardano("yoroi").await.unwrap();
        let api = wallet.enable(EnableOptions::default()).await.unwrap();
        (api, bus)
    }

    #[tokio::test]
    async fn methods_send_wire_names_and_defaults() {
        let (api, _bus) = enabled_api().await;

        let balance = api.get_balance(None).await.unwrap();
        assert_eq!(balance, json!(["get_balance", "cbor", ["*"]]));

        api.experimental().set_return_type(ReturnType::Json).await;
        let keys = api.cip95().get_pub_drep_key().await.unwrap();
        assert_eq!(keys, json!(["cip95_get_pub_drep_key", "json", []]));

        let signed = api.sign_tx("84a4", false).await.unwrap();
        assert_eq!(signed[2], json!([{ "tx": "84a4", "partialSign": false }]));
    }

    #[tokio::test]
    async fn disconnected_api_fails_locally_and_callbacks_fire_once() {
        let (api, bus) = enabled_api().await;
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            api.experimental()
                .on_disconnect(move || {
                    let _ = fired.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }

        bus.post_message(&PageMessage::Disconnect {
            protocol: Protocol::Cardano,
            reason: DisconnectReason::Revoked,
        })
        .unwrap();
        bus.post_message(&PageMessage::Disconnect {
            protocol: Protocol::Cardano,
            reason: DisconnectReason::WalletDisconnected,
        })
        .unwrap();

        while !api.is_disconnected().await {
            tokio::task::yield_now().await;
        }
        let error = api.get_network_id().await.unwrap_err();
        assert!(error.is_api(ApiErrorCode::Refused));
        assert_eq!(error.info, WALLET_DISCONNECTED);

        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn account_switch_fails_with_account_change() {
        let (api, bus) = enabled_api().await;

        bus.post_message(&PageMessage::Disconnect {
            protocol: Protocol::Cardano,
            reason: DisconnectReason::WalletDisconnected,
        })
        .unwrap();

        while !api.is_disconnected().await {
            tokio::task::yield_now().await;
        }
        let error = api.get_used_addresses(None).await.unwrap_err();
        assert!(error.is_api(ApiErrorCode::AccountChange));
        assert_eq!(error.info, WALLET_ACCOUNT_CHANGED);
    }

    #[tokio::test]
    async fn auth_is_only_present_with_identification() {
        let (api, _bus) = enabled_api().await;
        assert!(api.experimental().auth().is_none());
    }
}
