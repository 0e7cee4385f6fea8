use super::*;
use crate::{AddressKind, UtxoQuery, WalletScope, WalletStoreError, WindowError, WindowGeometry};
use async_trait::async_trait;
use dapp_connector::types::{
    connection::ConnectionState,
    error_codes::{ApiErrorCode, ErrorObject},
    message::PopupRoute,
    rpc::Uid,
    signing::SigningRequest,
};
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex as StdMutex,
    },
    time::Duration,
};

const ORIGIN: &str = "https://dapp.example";

#[derive(Default)]
struct MemoryConsent(StdMutex<HashMap<(String, Protocol), ConnectionRecord>>);

#[async_trait]
impl ConsentStore for MemoryConsent {
    async fn find_record(
        &self,
        origin: &str,
        protocol: Protocol,
    ) -> Result<Option<ConnectionRecord>, crate::ConsentStoreError> {
        let records = self.0.lock().unwrap();
        Ok(records.get(&(origin.to_string(), protocol)).cloned())
    }

    async fn save_record(&self, record: &ConnectionRecord) -> Result<(), crate::ConsentStoreError> {
        let mut records = self.0.lock().unwrap();
        let _ = records.insert((record.origin.clone(), record.protocol), record.clone());
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ConnectionRecord>, crate::ConsentStoreError> {
        Ok(self.0.lock().unwrap().values().cloned().collect())
    }
}

#[derive(Default)]
struct FakeWallet {
    auth_unavailable: bool,
}

#[async_trait]
impl WalletStore for FakeWallet {
    async fn network_id(&self, _scope: &WalletScope) -> Result<Value, WalletStoreError> {
        Ok(json!(1))
    }

    async fn balance(&self, scope: &WalletScope, token_id: &str) -> Result<Value, WalletStoreError> {
        Ok(json!({ "wallet": scope.wallet_id.as_str(), "token": token_id }))
    }

    async fn addresses(
        &self,
        _scope: &WalletScope,
        kind: AddressKind,
    ) -> Result<Vec<Value>, WalletStoreError> {
        Ok(match kind {
            AddressKind::Used => vec![json!("used-0"), json!("used-1"), json!("used-2")],
            AddressKind::Change => vec![json!("change-0"), json!("change-1")],
            _ => vec![],
        })
    }

    async fn utxos(
        &self,
        _scope: &WalletScope,
        query: &UtxoQuery,
    ) -> Result<Option<Vec<Value>>, WalletStoreError> {
        if query.amount.as_deref() == Some("1000000000") {
            return Ok(None);
        }
        Ok(Some(vec![json!("utxo-0"), json!("utxo-1")]))
    }

    async fn collateral(
        &self,
        _scope: &WalletScope,
        _required_amount: Option<&str>,
    ) -> Result<Value, WalletStoreError> {
        Ok(json!([]))
    }

    async fn stake_keys(
        &self,
        _scope: &WalletScope,
        registered: bool,
    ) -> Result<Vec<Value>, WalletStoreError> {
        Ok(if registered { vec![json!("stake")] } else { vec![] })
    }

    async fn drep_key(&self, _scope: &WalletScope) -> Result<Value, WalletStoreError> {
        Ok(json!("drep"))
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
        if self.auth_unavailable {
            return Err(WalletStoreError::Internal("key derivation failed".to_string()));
        }
        Ok(format!("pk-{wallet_id}"))
    }
}

struct FakeSigner;

#[async_trait]
impl Signer for FakeSigner {
    async fn sign(
        &self,
        _scope: &WalletScope,
        request: &SigningRequest,
    ) -> Result<Value, ErrorObject> {
        Ok(json!({ "signed": request.payload }))
    }

    async fn submit(&self, _scope: &WalletScope, _tx: &Value) -> Result<Value, ErrorObject> {
        Ok(json!("tx-hash"))
    }

    async fn sign_auth_payload(
        &self,
        _scope: &WalletScope,
        payload: &str,
    ) -> Result<Value, ErrorObject> {
        Ok(json!(format!("sig:{payload}")))
    }

    async fn check_auth_payload(
        &self,
        _scope: &WalletScope,
        payload: &str,
        signature: &str,
    ) -> Result<Value, ErrorObject> {
        Ok(json!(signature == format!("sig:{payload}")))
    }
}

#[derive(Default)]
struct FakeWindows {
    next: AtomicU32,
    opened: StdMutex<Vec<(WindowId, PopupRoute)>>,
    closed: StdMutex<Vec<WindowId>>,
}

impl FakeWindows {
    fn opened(&self) -> Vec<(WindowId, PopupRoute)> {
        self.opened.lock().unwrap().clone()
    }

    fn closed(&self) -> Vec<WindowId> {
        self.closed.lock().unwrap().clone()
    }

    /// Let spawned calls run until `count` windows have been opened.
    async fn wait_for(&self, count: usize) -> WindowId {
        loop {
            if let Some((window_id, _)) = self.opened().get(count - 1) {
                return *window_id;
            }
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl WindowManager for FakeWindows {
    async fn open(
        &self,
        route: PopupRoute,
        _geometry: WindowGeometry,
    ) -> Result<WindowId, WindowError> {
        let window_id = WindowId(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.opened.lock().unwrap().push((window_id, route));
        Ok(window_id)
    }

    async fn close(&self, window_id: WindowId) -> Result<(), WindowError> {
        self.closed.lock().unwrap().push(window_id);
        Ok(())
    }
}

#[derive(Default)]
struct FakeTabs(StdMutex<Vec<(TabId, BrokerEvent)>>);

#[async_trait]
impl TabPort for FakeTabs {
    async fn notify(&self, tab_id: TabId, event: BrokerEvent) -> Result<(), BrokerError> {
        self.0.lock().unwrap().push((tab_id, event));
        Ok(())
    }
}

struct Harness {
    broker: Broker,
    consent: Arc<MemoryConsent>,
    windows: Arc<FakeWindows>,
    tabs: Arc<FakeTabs>,
}

fn harness(config: Config) -> Harness {
    harness_with(config, FakeWallet::default())
}

fn harness_with(config: Config, wallet: FakeWallet) -> Harness {
    let consent = Arc::new(MemoryConsent::default());
    let windows = Arc::new(FakeWindows::default());
    let tabs = Arc::new(FakeTabs::default());
    let broker = Broker::new(
        config,
        Collaborators {
            consent: consent.clone(),
            wallet: Arc::new(wallet),
            signer: Arc::new(FakeSigner),
            windows: windows.clone(),
            tabs: tabs.clone(),
        },
    );
    Harness {
        broker,
        consent,
        windows,
        tabs,
    }
}

impl Harness {
    async fn grant(&self, protocol: Protocol, auth: bool) {
        let mut record = ConnectionRecord::new(ORIGIN, protocol);
        let _ = record.apply(ConnectionEvent::Requested).unwrap();
        let auth = auth.then(|| dapp_connector::types::connection::WalletAuth {
            wallet_id: "wallet-1".into(),
            pubkey: "pk-wallet-1".to_string(),
        });
        let _ = record
            .apply(ConnectionEvent::Approved {
                wallet_id: "wallet-1".into(),
                auth,
            })
            .unwrap();
        self.consent.save_record(&record).await.unwrap();
    }

    async fn state(&self, protocol: Protocol) -> ConnectionState {
        self.consent
            .find_record(ORIGIN, protocol)
            .await
            .unwrap()
            .map_or(ConnectionState::Disconnected, |r| r.state)
    }
}

fn connect_request(only_silent: bool) -> RuntimeRequest {
    RuntimeRequest::Connect {
        protocol: Protocol::Cardano,
        origin: ORIGIN.to_string(),
        request_identification: true,
        only_silent,
        favicon: String::new(),
    }
}

fn rpc(uid: u64, function: &str, params: Vec<Value>) -> RpcRequest {
    RpcRequest {
        uid: Uid(uid),
        protocol: Protocol::Cardano,
        function: function.to_string(),
        params,
        origin: ORIGIN.to_string(),
        return_type: None,
    }
}

fn expect_connect(reply: RuntimeReply) -> ConnectResponse {
    match reply {
        RuntimeReply::Connect(response) => response,
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn approved_connect_becomes_a_standing_grant() {
    let harness = harness(Config::default());
    let broker = harness.broker.clone();
    let pending =
        tokio::spawn(async move { broker.handle_runtime(TabId(7), connect_request(false)).await });

    let window_id = harness.windows.wait_for(1).await;
    assert_eq!(harness.state(Protocol::Cardano).await, ConnectionState::PendingApproval);

    let prompt = match harness
        .broker
        .handle_popup(PopupMessage::ConnectRetrieveData { window_id })
        .await
    {
        PopupReply::ConnectData { prompt } => prompt.unwrap(),
        other => panic!("unexpected reply {other:?}"),
    };
    assert_eq!(prompt.origin, ORIGIN);
    assert!(prompt.request_identification);

    let _ = harness
        .broker
        .handle_popup(PopupMessage::ConnectResponse {
            window_id,
            accepted: true,
            wallet_id: Some("wallet-1".into()),
        })
        .await;

    let response = expect_connect(pending.await.unwrap());
    assert!(response.success);
    assert_eq!(response.auth.unwrap().pubkey, "pk-wallet-1");
    assert_eq!(harness.state(Protocol::Cardano).await, ConnectionState::Connected);

    // Asking again is answered without a window.
    let again = expect_connect(
        harness
            .broker
            .handle_runtime(TabId(8), connect_request(true))
            .await,
    );
    assert!(again.success);
    assert_eq!(harness.windows.opened().len(), 1);
}

#[tokio::test]
async fn silent_connect_without_grant_changes_nothing() {
    let harness = harness(Config::default());
    let response = expect_connect(
        harness
            .broker
            .handle_runtime(TabId(1), connect_request(true))
            .await,
    );

    assert!(!response.success);
    assert!(response.err.unwrap().is_api(ApiErrorCode::Refused));
    assert!(harness.windows.opened().is_empty());
    assert!(harness
        .consent
        .find_record(ORIGIN, Protocol::Cardano)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn closing_the_connect_window_refuses_every_waiting_tab() {
    let harness = harness(Config::default());
    let first = harness.broker.clone();
    let second = harness.broker.clone();
    let first =
        tokio::spawn(async move { first.handle_runtime(TabId(1), connect_request(false)).await });
    let window_id = harness.windows.wait_for(1).await;
    let second =
        tokio::spawn(async move { second.handle_runtime(TabId(2), connect_request(false)).await });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    harness.broker.window_removed(window_id).await;

    for response in [first.await.unwrap(), second.await.unwrap()] {
        let response = expect_connect(response);
        assert!(!response.success);
    }
    assert_eq!(harness.windows.opened().len(), 1);
    assert_eq!(harness.state(Protocol::Cardano).await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn failed_approval_answers_every_tab_and_resets_the_record() {
    let harness = harness_with(
        Config::default(),
        FakeWallet {
            auth_unavailable: true,
        },
    );
    let first = harness.broker.clone();
    let second = harness.broker.clone();
    let first =
        tokio::spawn(async move { first.handle_runtime(TabId(1), connect_request(false)).await });
    let window_id = harness.windows.wait_for(1).await;
    let second =
        tokio::spawn(async move { second.handle_runtime(TabId(2), connect_request(false)).await });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let _ = harness
        .broker
        .handle_popup(PopupMessage::ConnectResponse {
            window_id,
            accepted: true,
            wallet_id: Some("wallet-1".into()),
        })
        .await;

    for response in [first.await.unwrap(), second.await.unwrap()] {
        let response = expect_connect(response);
        assert!(!response.success);
        assert!(response.err.unwrap().is_api(ApiErrorCode::InternalError));
    }
    assert_eq!(harness.state(Protocol::Cardano).await, ConnectionState::Disconnected);
    assert!(!harness.broker.is_enabled(ORIGIN, Protocol::Cardano).await);
}

#[tokio::test]
async fn calls_need_a_grant_and_a_known_function() {
    let harness = harness(Config::default());

    let refused = harness
        .broker
        .handle_rpc(TabId(1), rpc(1, "get_balance", vec![]))
        .await;
    assert!(refused.result.unwrap_err().is_api(ApiErrorCode::Refused));

    harness.grant(Protocol::Cardano, false).await;
    let unknown = harness
        .broker
        .handle_rpc(TabId(1), rpc(2, "steal_keys", vec![]))
        .await;
    assert!(unknown.result.unwrap_err().is_api(ApiErrorCode::InvalidRequest));

    let too_many = harness
        .broker
        .handle_rpc(TabId(1), rpc(3, "get_network_id", vec![json!(1)]))
        .await;
    assert!(too_many.result.unwrap_err().is_api(ApiErrorCode::InvalidRequest));
}

#[tokio::test]
async fn queries_apply_defaults_and_pagination() {
    let harness = harness(Config::default());
    harness.grant(Protocol::Cardano, false).await;

    let balance = harness
        .broker
        .handle_rpc(TabId(1), rpc(1, "get_balance", vec![]))
        .await;
    assert_eq!(balance.result.unwrap()["token"], json!("*"));

    let page = harness
        .broker
        .handle_rpc(
            TabId(1),
            rpc(2, "get_used_addresses", vec![json!({ "page": 1, "limit": 2 })]),
        )
        .await;
    assert_eq!(page.result.unwrap(), json!(["used-2"]));

    let out_of_range = harness
        .broker
        .handle_rpc(
            TabId(1),
            rpc(3, "get_used_addresses", vec![json!({ "page": 5, "limit": 2 })]),
        )
        .await;
    assert_eq!(out_of_range.result.unwrap_err().max_size, Some(2));

    let change = harness
        .broker
        .handle_rpc(TabId(1), rpc(4, "get_change_address", vec![]))
        .await;
    assert_eq!(change.result.unwrap(), json!("change-0"));

    let short = harness
        .broker
        .handle_rpc(TabId(1), rpc(5, "get_utxos", vec![json!("1000000000")]))
        .await;
    assert_eq!(short.result.unwrap(), Value::Null);

    let enabled = harness
        .broker
        .handle_rpc(TabId(1), rpc(6, "is_enabled/cardano", vec![]))
        .await;
    assert_eq!(enabled.result.unwrap(), json!(true));
}

#[tokio::test]
async fn closing_the_signing_window_declines_without_disconnecting() {
    let harness = harness(Config::default());
    harness.grant(Protocol::Cardano, false).await;

    let broker = harness.broker.clone();
    let pending = tokio::spawn(async move {
        broker
            .handle_rpc(TabId(1), rpc(9, "sign_tx", vec![json!({ "tx": "84a4" })]))
            .await
    });
    let window_id = harness.windows.wait_for(1).await;
    assert_eq!(harness.windows.opened()[0].1, PopupRoute::Sign);

    harness.broker.window_removed(window_id).await;

    let error = pending.await.unwrap().result.unwrap_err();
    assert_eq!(error.code, 2);
    assert_eq!(harness.state(Protocol::Cardano).await, ConnectionState::Connected);
}

#[tokio::test]
async fn signing_requests_of_a_tab_are_shown_one_at_a_time() {
    let harness = harness(Config::default());
    harness.grant(Protocol::Cardano, false).await;

    let first = harness.broker.clone();
    let first = tokio::spawn(async move {
        first
            .handle_rpc(TabId(1), rpc(1, "sign_data", vec![json!("addr"), json!("cafe")]))
            .await
    });
    let first_window = harness.windows.wait_for(1).await;

    let second = harness.broker.clone();
    let second = tokio::spawn(async move {
        second
            .handle_rpc(TabId(1), rpc(2, "sign_data", vec![json!("addr"), json!("beef")]))
            .await
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(harness.windows.opened().len(), 1);

    let shown = harness.broker.signing_request(first_window).await.unwrap();
    assert_eq!(shown.uid, Uid(1));

    // The queued request has not been shown, so it cannot be confirmed.
    for window_id in [first_window, WindowId(99)] {
        let _ = harness
            .broker
            .handle_popup(PopupMessage::SignConfirmed {
                window_id,
                uid: Uid(2),
                tab_id: TabId(1),
            })
            .await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!second.is_finished());
    assert_eq!(
        harness.broker.signing_request(first_window).await.unwrap().uid,
        Uid(1)
    );

    let _ = harness
        .broker
        .handle_popup(PopupMessage::SignConfirmed {
            window_id: first_window,
            uid: Uid(1),
            tab_id: TabId(1),
        })
        .await;
    // A repeated decision is ignored.
    assert!(harness
        .broker
        .decide(TabId(1), Uid(1), Decision::Rejected)
        .await
        .is_none());

    let signed = first.await.unwrap().result.unwrap();
    assert_eq!(signed["signed"]["payload"], json!("cafe"));

    let second_window = harness.windows.wait_for(2).await;
    let _ = harness
        .broker
        .handle_popup(PopupMessage::SignRejected {
            window_id: second_window,
            uid: Uid(2),
            tab_id: TabId(1),
        })
        .await;
    assert_eq!(second.await.unwrap().result.unwrap_err().code, 3);
    assert!(harness.broker.signing_request(second_window).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn undecided_requests_expire() {
    let harness = harness(Config {
        decision_timeout: Some(Duration::from_secs(60)),
        ..Config::default()
    });
    harness.grant(Protocol::Cardano, false).await;

    let response = harness
        .broker
        .handle_rpc(TabId(1), rpc(1, "submit_tx", vec![json!("84a4")]))
        .await;

    assert_eq!(response.result.unwrap_err().code, 1);
    assert_eq!(harness.windows.closed().len(), 1);
}

#[tokio::test]
async fn submit_can_skip_confirmation() {
    let harness = harness(Config {
        confirm_submit: false,
        ..Config::default()
    });
    harness.grant(Protocol::Cardano, false).await;

    let response = harness
        .broker
        .handle_rpc(TabId(1), rpc(1, "submit_tx", vec![json!("84a4")]))
        .await;
    assert_eq!(response.result.unwrap(), json!("tx-hash"));
    assert!(harness.windows.opened().is_empty());
}

#[tokio::test]
async fn auth_requires_identification() {
    let harness = harness(Config::default());
    harness.grant(Protocol::Cardano, false).await;
    let refused = harness
        .broker
        .handle_rpc(TabId(1), rpc(1, "auth_sign_hex_payload", vec![json!("ab")]))
        .await;
    assert!(refused.result.unwrap_err().is_api(ApiErrorCode::Refused));

    harness.grant(Protocol::Cardano, true).await;
    let signed = harness
        .broker
        .handle_rpc(TabId(1), rpc(2, "auth_sign_hex_payload", vec![json!("ab")]))
        .await;
    assert_eq!(signed.result.unwrap(), json!("sig:ab"));
}

#[tokio::test]
async fn revoking_notifies_tabs_that_used_the_grant() {
    let harness = harness(Config::default());
    harness.grant(Protocol::Cardano, false).await;
    let _ = harness
        .broker
        .handle_rpc(TabId(4), rpc(1, "get_network_id", vec![]))
        .await;

    assert!(harness.broker.revoke(ORIGIN, Protocol::Cardano).await.unwrap());
    assert!(!harness.broker.revoke(ORIGIN, Protocol::Cardano).await.unwrap());

    let events = harness.tabs.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![(
            TabId(4),
            BrokerEvent::Disconnect {
                origin: ORIGIN.to_string(),
                protocol: Protocol::Cardano,
                reason: DisconnectReason::Revoked,
            }
        )]
    );
    assert!(!harness.broker.is_enabled(ORIGIN, Protocol::Cardano).await);
}

#[tokio::test]
async fn closing_a_tab_rejects_its_signing_requests() {
    let harness = harness(Config::default());
    harness.grant(Protocol::Cardano, false).await;

    let broker = harness.broker.clone();
    let pending = tokio::spawn(async move {
        broker
            .handle_rpc(TabId(3), rpc(1, "sign_tx", vec![json!("84a4")]))
            .await
    });
    let window_id = harness.windows.wait_for(1).await;

    harness.broker.tab_removed(TabId(3)).await;

    assert_eq!(pending.await.unwrap().result.unwrap_err().code, 2);
    assert_eq!(harness.windows.closed(), vec![window_id]);
}
