use dapp_connector::{
    constants::{span_fields, WALLET_ACCOUNT_CHANGED, WALLET_DISCONNECTED},
    infrastructure::{
        channel::{WindowBus, WindowListener},
        logging::record_field,
    },
    types::{
        capability::WalletDescriptor,
        error_codes::{ApiErrorCode, ErrorObject},
        injection::{BuildFlavor, Document, InjectionMarker},
        message::{ConnectRequest, ConnectResponse, DisconnectReason, PageMessage},
        protocol::{Protocol, ReturnType},
        rpc::RpcRequest,
    },
};
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, info_span, instrument};
use tracing_futures::Instrument;

use crate::{
    cardano::CardanoWallet, correlation::CorrelationTable, ergo::ErgoConnector, PageError,
};

/// Whether the realm's `message` listener is attached.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ListenerState {
    #[default]
    NotRegistered,
    Registered,
}

pub(crate) type DisconnectCallback = Box<dyn FnOnce() + Send + 'static>;

/// State shared by one API instance and its clones.
pub(crate) struct Session {
    protocol: Protocol,
    state: Mutex<SessionState>,
}

struct SessionState {
    disconnected: Option<DisconnectReason>,
    return_type: ReturnType,
    callbacks: Vec<DisconnectCallback>,
}

impl Session {
    fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            state: Mutex::new(SessionState {
                disconnected: None,
                return_type: ReturnType::default(),
                callbacks: Vec::new(),
            }),
        }
    }

    pub(crate) fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The return type to send with the next call, or the local error a
    /// disconnected instance fails with.
    pub(crate) async fn check(&self) -> Result<ReturnType, ErrorObject> {
        let state = self.state.lock().await;
        match state.disconnected {
            None => Ok(state.return_type),
            Some(DisconnectReason::WalletDisconnected) => Err(ErrorObject::api(
                ApiErrorCode::AccountChange,
                WALLET_ACCOUNT_CHANGED,
            )),
            Some(_) => Err(ErrorObject::api(ApiErrorCode::Refused, WALLET_DISCONNECTED)),
        }
    }

    pub(crate) async fn set_return_type(&self, return_type: ReturnType) {
        self.state.lock().await.return_type = return_type;
    }

    pub(crate) async fn is_disconnected(&self) -> bool {
        self.state.lock().await.disconnected.is_some()
    }

    /// Register a callback for disconnection. It runs right away if the
    /// session is already disconnected.
    pub(crate) async fn on_disconnect(&self, callback: DisconnectCallback) {
        let mut state = self.state.lock().await;
        if state.disconnected.is_some() {
            drop(state);
            callback();
        } else {
            state.callbacks.push(callback);
        }
    }

    async fn disconnect(&self, reason: DisconnectReason) {
        let callbacks = {
            let mut state = self.state.lock().await;
            if state.disconnected.is_some() {
                return;
            }
            state.disconnected = Some(reason);
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback();
        }
    }
}

#[derive(Debug, Clone)]
struct InstalledWallet {
    descriptor: WalletDescriptor,
    flavor: BuildFlavor,
}

#[derive(Default)]
struct RealmState {
    listener: ListenerState,
    calls: CorrelationTable,
    connect_waiters: HashMap<Protocol, Vec<oneshot::Sender<ConnectResponse>>>,
    sessions: HashMap<Protocol, Vec<Arc<Session>>>,
    connected: HashSet<Protocol>,
    cardano: HashMap<String, InstalledWallet>,
    ergo: Option<BuildFlavor>,
}

struct RealmInner {
    bus: WindowBus,
    document: Arc<dyn Document>,
    state: Mutex<RealmState>,
}

/// One injected page realm. Everything the injected script keeps between
/// calls lives here, so two realms never share uids or callbacks.
#[derive(Clone)]
pub struct Realm {
    inner: Arc<RealmInner>,
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("origin", &self.inner.bus.origin())
            .finish()
    }
}

impl Realm {
    pub fn new(bus: WindowBus, document: Arc<dyn Document>) -> Self {
        Self {
            inner: Arc::new(RealmInner {
                bus,
                document,
                state: Mutex::new(RealmState::default()),
            }),
        }
    }

    pub fn origin(&self) -> String {
        self.inner.document.origin()
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.inner.document
    }

    pub async fn listener_state(&self) -> ListenerState {
        self.inner.state.lock().await.listener
    }

    /// Attach the `message` listener. Calling this again is a no-op; returns
    /// whether this call attached it.
    pub async fn listen(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.listener == ListenerState::Registered {
            return false;
        }
        state.listener = ListenerState::Registered;

        let listener = self.inner.bus.subscribe();
        let realm = Arc::downgrade(&self.inner);
        let span = info_span!("page_listener", origin = %self.inner.bus.origin());
        let _ = tokio::spawn(listen_loop(realm, listener).instrument(span));
        true
    }

    /// Install the wallet globals and leave the injection marker.
    #[instrument(skip_all, fields(wallet = %descriptor.name, flavor = %flavor))]
    pub async fn install(
        &self,
        descriptor: WalletDescriptor,
        flavor: BuildFlavor,
    ) -> Result<(), PageError> {
        let _ = self.listen().await;

        self.inner.document.set_injection_marker(InjectionMarker {
            flavor,
            wallet_name: descriptor.name.clone(),
        });
        {
            let mut state = self.inner.state.lock().await;
            let _ = state
                .cardano
                .insert(descriptor.name.clone(), InstalledWallet { descriptor, flavor });
            state.ergo = Some(flavor);
        }

        self.inner.bus.post_message(&PageMessage::ScriptInjected)?;
        info!("Installed wallet globals.");
        Ok(())
    }

    /// `window.cardano.<name>`, if installed.
    pub async fn cardano(&self, name: &str) -> Option<CardanoWallet> {
        let state = self.inner.state.lock().await;
        state.cardano.get(name).map(|installed| {
            CardanoWallet::new(self.clone(), installed.descriptor.clone(), installed.flavor)
        })
    }

    /// The ergo connector, if installed.
    pub async fn ergo(&self) -> Option<ErgoConnector> {
        let state = self.inner.state.lock().await;
        state.ergo.map(|flavor| ErgoConnector::new(self.clone(), flavor))
    }

    pub async fn outstanding_calls(&self) -> usize {
        self.inner.state.lock().await.calls.outstanding()
    }

    /// Whether the relay last reported `protocol` as connected. Local and
    /// advisory only; `is_enabled` asks the broker.
    pub async fn is_connected(&self, protocol: Protocol) -> bool {
        self.inner.state.lock().await.connected.contains(&protocol)
    }

    pub(crate) async fn open_session(&self, protocol: Protocol) -> Arc<Session> {
        let session = Arc::new(Session::new(protocol));
        self.inner
            .state
            .lock()
            .await
            .sessions
            .entry(protocol)
            .or_default()
            .push(session.clone());
        session
    }

    #[instrument(skip(self, request), err(Debug))]
    pub(crate) async fn connect(
        &self,
        protocol: Protocol,
        request: ConnectRequest,
    ) -> Result<ConnectResponse, ErrorObject> {
        let receiver = {
            let mut state = self.inner.state.lock().await;
            if state.listener != ListenerState::Registered {
                return Err(PageError::NotListening.into());
            }
            let (sender, receiver) = oneshot::channel();
            state
                .connect_waiters
                .entry(protocol)
                .or_default()
                .push(sender);
            receiver
        };

        self.inner
            .bus
            .post_message(&PageMessage::ConnectRequest { protocol, request })
            .map_err(PageError::from)?;

        receiver
            .await
            .map_err(|_| ErrorObject::from(PageError::ResponseDropped))
    }

    /// Post one RPC and wait for its response.
    #[instrument(skip(self, params), fields(uid), err(Debug))]
    pub(crate) async fn call(
        &self,
        protocol: Protocol,
        function: String,
        params: Vec<Value>,
        return_type: Option<ReturnType>,
    ) -> Result<Value, ErrorObject> {
        let (uid, receiver) = {
            let mut state = self.inner.state.lock().await;
            if state.listener != ListenerState::Registered {
                return Err(PageError::NotListening.into());
            }
            state.calls.register(protocol)
        };
        record_field(span_fields::UID, &uid);

        let request = RpcRequest {
            uid,
            protocol,
            function,
            params,
            origin: self.origin(),
            return_type,
        };
        if let Err(e) = self.inner.bus.post_message(&PageMessage::RpcRequest(request)) {
            self.inner.state.lock().await.calls.cancel(uid);
            return Err(PageError::from(e).into());
        }

        receiver
            .await
            .map_err(|_| ErrorObject::from(PageError::ResponseDropped))?
    }

    async fn handle_message(&self, message: PageMessage) {
        match message {
            PageMessage::RpcResponse(response) => {
                let _ = self.inner.state.lock().await.calls.resolve(response);
            }
            PageMessage::ConnectResponse { protocol, response } => {
                let waiters = {
                    let mut state = self.inner.state.lock().await;
                    if response.success {
                        let _ = state.connected.insert(protocol);
                    }
                    state.connect_waiters.remove(&protocol).unwrap_or_default()
                };
                if waiters.is_empty() {
                    debug!("Connect response for {} with nobody waiting.", protocol);
                }
                for waiter in waiters {
                    let _ = waiter.send(response.clone());
                }
            }
            PageMessage::Connected { protocol } => {
                let _ = self.inner.state.lock().await.connected.insert(protocol);
            }
            PageMessage::Disconnect { protocol, reason } => {
                self.disconnect(protocol, reason).await
            }
            // Our own outgoing traffic.
            PageMessage::ConnectRequest { .. }
            | PageMessage::RpcRequest(_)
            | PageMessage::ScriptInjected => {}
        }
    }

    /// Irreversibly disconnect every API instance of `protocol` and run their
    /// callbacks once.
    async fn disconnect(&self, protocol: Protocol, reason: DisconnectReason) {
        let sessions = {
            let mut state = self.inner.state.lock().await;
            let _ = state.connected.remove(&protocol);
            state.sessions.remove(&protocol).unwrap_or_default()
        };
        info!(
            "Disconnecting {} API instance(s) for {} ({}).",
            sessions.len(),
            protocol,
            reason
        );
        for session in sessions {
            session.disconnect(reason).await;
        }
    }
}

async fn listen_loop(realm: Weak<RealmInner>, mut listener: WindowListener) {
    loop {
        let message = match listener.receive().await {
            Ok(message) => message,
            Err(_) => break,
        };
        let Some(inner) = realm.upgrade() else {
            break;
        };
        Realm { inner }.handle_message(message).await;
    }
    debug!("Page listener stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapp_connector::types::{injection::StaticDocument, rpc::RpcResponse};
    use serde_json::json;

    fn realm() -> (Realm, WindowBus) {
        let bus = WindowBus::new("https://dapp.example");
        let document = Arc::new(StaticDocument::new("https://dapp.example", None));
        (Realm::new(bus.clone(), document), bus)
    }

    #[tokio::test]
    async fn listen_is_idempotent() {
        let (realm, _bus) = realm();
        assert_eq!(realm.listener_state().await, ListenerState::NotRegistered);
        assert!(realm.listen().await);
        assert!(!realm.listen().await);
        assert_eq!(realm.listener_state().await, ListenerState::Registered);
    }

    #[tokio::test]
    async fn calls_require_a_listener() {
        let (realm, _bus) = realm();
        let error = realm
            .call(Protocol::Cardano, "get_network_id".to_string(), vec![], None)
            .await
            .unwrap_err();
        assert!(error.is_api(ApiErrorCode::InternalError));
    }

    #[tokio::test]
    async fn calls_resolve_from_posted_responses() {
        let (realm, bus) = realm();
        let _ = realm.listen().await;
        let mut relay = bus.subscribe();

        let caller = {
            let realm = realm.clone();
            tokio::spawn(async move {
                realm
                    .call(Protocol::Cardano, "get_network_id".to_string(), vec![], None)
                    .await
            })
        };

        let request = loop {
            if let PageMessage::RpcRequest(request) = relay.receive().await.unwrap() {
                break request;
            }
        };
        assert_eq!(request.origin, "https://dapp.example");
        bus.post_message(&PageMessage::RpcResponse(RpcResponse::ok(
            request.uid,
            json!(1),
        )))
        .unwrap();

        assert_eq!(caller.await.unwrap().unwrap(), json!(1));
        assert_eq!(realm.outstanding_calls().await, 0);
    }

    #[tokio::test]
    async fn install_writes_marker_and_globals() {
        let (realm, _bus) = realm();
        realm
            .install(WalletDescriptor::new("yoroi", ""), BuildFlavor::Nightly)
            .await
            .unwrap();

        let marker = realm.document().injection_marker().unwrap();
        assert_eq!(marker.flavor, BuildFlavor::Nightly);
        assert_eq!(
            realm.cardano("yoroi").await.map(|w| w.flavor()),
            Some(BuildFlavor::Nightly)
        );
        assert!(realm.cardano("other").await.is_none());
        assert!(realm.ergo().await.is_some());
    }
}
