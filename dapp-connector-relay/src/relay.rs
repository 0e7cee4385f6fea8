use dapp_connector::{
    constants::span_fields,
    infrastructure::{
        channel::{WindowBus, WindowListener},
        logging::record_field,
    },
    types::{
        capability::{parse_is_enabled, WalletDescriptor},
        error_codes::{ApiErrorCode, ErrorObject},
        injection::{may_inject, Document},
        message::{
            BrokerEvent, ConnectRequest, ConnectResponse, DisconnectReason, PageMessage,
            RuntimeReply, RuntimeRequest,
        },
        protocol::Protocol,
        rpc::{RpcRequest, RpcResponse, Uid},
    },
};
use dapp_connector_page::Realm;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, info_span, instrument, warn};
use tracing_futures::Instrument;

use crate::{
    favicon::{capture_favicon, FaviconFetcher},
    heartbeat::{HeartbeatAction, HeartbeatMonitor},
    Config, RelayError, RuntimeChannel,
};

#[derive(Debug, Default)]
struct RelayState {
    /// Calls forwarded to the broker and not yet answered to the page.
    outstanding: HashMap<Uid, Protocol>,
    heartbeats: HashMap<Protocol, HeartbeatMonitor>,
    injected: bool,
}

struct RelayInner {
    config: Config,
    bus: WindowBus,
    document: Arc<dyn Document>,
    runtime: Arc<dyn RuntimeChannel>,
    favicon: Arc<dyn FaviconFetcher>,
    state: Mutex<RelayState>,
}

/// Content-script relay for one page.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("origin", &self.inner.bus.origin())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Background tasks of a started relay. Dropping this stops them, as a tab
/// closing would.
#[derive(Debug, Default)]
pub struct RelayTasks {
    handles: Vec<JoinHandle<()>>,
}

impl RelayTasks {
    pub fn abort_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for RelayTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

impl Relay {
    pub fn new(
        config: Config,
        bus: WindowBus,
        document: Arc<dyn Document>,
        runtime: Arc<dyn RuntimeChannel>,
        favicon: Arc<dyn FaviconFetcher>,
    ) -> Self {
        let heartbeats = config
            .heartbeat_protocols
            .iter()
            .map(|protocol| {
                (
                    *protocol,
                    HeartbeatMonitor::new(config.disconnect_threshold, config.reject_threshold),
                )
            })
            .collect();

        Self {
            inner: Arc::new(RelayInner {
                config,
                bus,
                document,
                runtime,
                favicon,
                state: Mutex::new(RelayState {
                    heartbeats,
                    ..Default::default()
                }),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Install the wallet globals into `realm` unless a build with higher
    /// precedence already did. Returns whether this build injected.
    #[instrument(skip_all, fields(flavor = %self.inner.config.flavor), err(Debug))]
    pub async fn inject(&self, realm: &Realm) -> Result<bool, RelayError> {
        let existing = self.inner.document.injection_marker();
        if !may_inject(self.inner.config.flavor, existing.as_ref()) {
            info!(
                "Not injecting, {:?} already injected.",
                existing.map(|marker| marker.flavor)
            );
            return Ok(false);
        }

        let descriptor = WalletDescriptor::new(
            self.inner.config.wallet_name.clone(),
            self.inner.config.wallet_icon.clone(),
        );
        realm.install(descriptor, self.inner.config.flavor).await?;
        Ok(true)
    }

    /// Attach to the window and start the heartbeat timers.
    pub fn start(&self) -> RelayTasks {
        let mut tasks = RelayTasks::default();

        let listener = self.inner.bus.subscribe();
        let span = info_span!("relay", origin = %self.inner.bus.origin());
        tasks
            .handles
            .push(tokio::spawn(self.clone().listen(listener).instrument(span)));

        for protocol in &self.inner.config.heartbeat_protocols {
            let span = info_span!("heartbeat", protocol = %protocol);
            tasks.handles.push(tokio::spawn(
                self.clone().run_heartbeat(*protocol).instrument(span),
            ));
        }
        tasks
    }

    pub async fn is_injected(&self) -> bool {
        self.inner.state.lock().await.injected
    }

    pub async fn outstanding(&self) -> usize {
        self.inner.state.lock().await.outstanding.len()
    }

    async fn listen(self, mut listener: WindowListener) {
        while let Ok(message) = listener.receive().await {
            match message {
                PageMessage::ConnectRequest { protocol, request } => {
                    let relay = self.clone();
                    let _ = tokio::spawn(
                        async move { relay.handle_connect(protocol, request).await }
                            .in_current_span(),
                    );
                }
                PageMessage::RpcRequest(request) => {
                    let relay = self.clone();
                    let _ = tokio::spawn(
                        async move { relay.handle_rpc(request).await }.in_current_span(),
                    );
                }
                PageMessage::ScriptInjected => {
                    self.inner.state.lock().await.injected = true;
                    debug!("Page reported script injected.");
                }
                // Our own traffic towards the page.
                PageMessage::ConnectResponse { .. }
                | PageMessage::RpcResponse(_)
                | PageMessage::Connected { .. }
                | PageMessage::Disconnect { .. } => {}
            }
        }
        debug!("Relay listener stopped.");
    }

    fn post(&self, message: &PageMessage) {
        if let Err(e) = self.inner.bus.post_message(message) {
            warn!("Failed to post {} to the page: {}", message.message_type(), e);
        }
    }

    /// Forward a connect request with the page's favicon attached. Approval
    /// is entirely up to the broker.
    #[instrument(skip(self, request), fields(origin))]
    pub async fn handle_connect(&self, protocol: Protocol, request: ConnectRequest) {
        let origin = self.inner.document.origin();
        record_field(span_fields::ORIGIN, &origin);

        let favicon =
            capture_favicon(self.inner.favicon.as_ref(), self.inner.document.as_ref()).await;
        let reply = self
            .inner
            .runtime
            .send_message(RuntimeRequest::Connect {
                protocol,
                origin,
                request_identification: request.request_identification,
                only_silent: request.only_silent,
                favicon,
            })
            .await;

        let response = match reply {
            Ok(RuntimeReply::Connect(response)) => response,
            Ok(_) => ConnectResponse::refused(RelayError::UnexpectedReply("connect").into()),
            Err(e) => {
                warn!("Connect request did not reach the background: {}", e);
                ConnectResponse::refused(e.into())
            }
        };
        let success = response.success;
        self.post(&PageMessage::ConnectResponse { protocol, response });
        if success {
            self.post(&PageMessage::Connected { protocol });
        }
    }

    /// Forward one call to the broker. The page always gets exactly one
    /// response for it, synthesized locally if the broker cannot be reached.
    #[instrument(skip_all, fields(uid = %request.uid, function = %request.function))]
    pub async fn handle_rpc(&self, mut request: RpcRequest) {
        // Consent is keyed by origin, so only the document's own counts.
        let origin = self.inner.document.origin();
        if request.origin != origin {
            warn!("Call claimed origin {}, forwarding as {}.", request.origin, origin);
            request.origin = origin;
        }

        let uid = request.uid;
        let protocol = request.protocol;
        let _ = self
            .inner
            .state
            .lock()
            .await
            .outstanding
            .insert(uid, protocol);

        let response = match parse_is_enabled(&request.function) {
            Some(is_enabled_protocol) => {
                self.forward_is_enabled(uid, is_enabled_protocol, request.origin)
                    .await
            }
            None => self.forward_rpc(request).await,
        };

        // A forced rejection may already have answered this uid.
        if self
            .inner
            .state
            .lock()
            .await
            .outstanding
            .remove(&uid)
            .is_none()
        {
            debug!("Dropping late response for force-rejected uid {}.", uid);
            return;
        }
        self.post(&PageMessage::RpcResponse(response));
    }

    async fn forward_is_enabled(&self, uid: Uid, protocol: Protocol, origin: String) -> RpcResponse {
        match self
            .inner
            .runtime
            .send_message(RuntimeRequest::IsEnabled { protocol, origin })
            .await
        {
            Ok(RuntimeReply::IsEnabled { enabled }) => RpcResponse::ok(uid, enabled.into()),
            Ok(_) => RpcResponse::err(uid, RelayError::UnexpectedReply("is_enabled").into()),
            Err(e) => RpcResponse::err(uid, e.into()),
        }
    }

    async fn forward_rpc(&self, request: RpcRequest) -> RpcResponse {
        let uid = request.uid;
        match self
            .inner
            .runtime
            .send_message(RuntimeRequest::Rpc(request))
            .await
        {
            Ok(RuntimeReply::Rpc(response)) if response.uid == uid => response,
            Ok(RuntimeReply::Rpc(response)) => {
                warn!("Broker answered uid {} for uid {}.", response.uid, uid);
                RpcResponse::err(uid, RelayError::UnexpectedReply("rpc uid").into())
            }
            Ok(_) => RpcResponse::err(uid, RelayError::UnexpectedReply("rpc").into()),
            Err(e) => {
                warn!("Call did not reach the background: {}", e);
                RpcResponse::err(uid, e.into())
            }
        }
    }

    /// Push from the broker.
    pub async fn handle_broker_event(&self, event: BrokerEvent) {
        match event {
            BrokerEvent::Disconnect {
                origin,
                protocol,
                reason,
            } => {
                if origin != self.inner.document.origin() {
                    return;
                }
                info!("Broker disconnected {} ({}).", protocol, reason);
                self.post(&PageMessage::Disconnect { protocol, reason });
            }
        }
    }

    /// Fail every outstanding call of `protocol`.
    pub async fn reject_all(&self, protocol: Protocol) -> usize {
        let uids: Vec<Uid> = {
            let mut state = self.inner.state.lock().await;
            let uids: Vec<Uid> = state
                .outstanding
                .iter()
                .filter(|(_, p)| **p == protocol)
                .map(|(uid, _)| *uid)
                .collect();
            for uid in &uids {
                let _ = state.outstanding.remove(uid);
            }
            uids
        };

        for uid in &uids {
            self.post(&PageMessage::RpcResponse(RpcResponse::err(
                *uid,
                ErrorObject::api(ApiErrorCode::InternalError, "Wallet connection timed out"),
            )));
        }
        uids.len()
    }

    async fn run_heartbeat(self, protocol: Protocol) {
        let mut interval = tokio::time::interval(self.inner.config.heartbeat_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        let _ = interval.tick().await;

        loop {
            let _ = interval.tick().await;

            let action = match self.inner.state.lock().await.heartbeats.get_mut(&protocol) {
                Some(monitor) => monitor.tick(),
                None => return,
            };
            match action {
                HeartbeatAction::None => {}
                HeartbeatAction::Disconnect => {
                    warn!("Heartbeat lost, disconnecting {}.", protocol);
                    self.post(&PageMessage::Disconnect {
                        protocol,
                        reason: DisconnectReason::ConnectionLost,
                    });
                }
                HeartbeatAction::RejectAll => {
                    let rejected = self.reject_all(protocol).await;
                    warn!("Heartbeat lost, rejected {} call(s).", rejected);
                }
            }

            let relay = self.clone();
            let _ = tokio::spawn(async move { relay.ping(protocol).await }.in_current_span());
        }
    }

    async fn ping(&self, protocol: Protocol) {
        let origin = self.inner.document.origin();
        match self
            .inner
            .runtime
            .send_message(RuntimeRequest::Ping { protocol, origin })
            .await
        {
            Ok(RuntimeReply::Pong) => {
                if let Some(monitor) = self.inner.state.lock().await.heartbeats.get_mut(&protocol) {
                    monitor.ping_succeeded();
                }
            }
            Ok(_) => debug!("Unexpected reply to ping."),
            Err(e) => debug!("Ping failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::favicon::NoFavicon;
    use async_trait::async_trait;
    use dapp_connector::types::injection::{BuildFlavor, StaticDocument};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    const ORIGIN: &str = "https://dapp.example";

    fn config(flavor: BuildFlavor) -> Config {
        Config {
            flavor,
            wallet_name: "yoroi".to_string(),
            wallet_icon: String::new(),
            heartbeat_period: Duration::from_secs(1),
            disconnect_threshold: 3,
            reject_threshold: 5,
            heartbeat_protocols: vec![],
            favicon_timeout: Duration::from_secs(1),
        }
    }

    /// A background that is gone.
    struct DeadRuntime;

    #[async_trait]
    impl RuntimeChannel for DeadRuntime {
        async fn send_message(&self, _: RuntimeRequest) -> Result<RuntimeReply, RelayError> {
            Err(RelayError::RuntimeUnavailable("background torn down".to_string()))
        }
    }

    /// A background that never answers calls and fails every ping.
    struct HungRuntime;

    #[async_trait]
    impl RuntimeChannel for HungRuntime {
        async fn send_message(&self, request: RuntimeRequest) -> Result<RuntimeReply, RelayError> {
            match request {
                RuntimeRequest::Ping { .. } => {
                    Err(RelayError::RuntimeUnavailable("no answer".to_string()))
                }
                _ => std::future::pending().await,
            }
        }
    }

    /// Records what reaches the background and refuses it.
    #[derive(Default)]
    struct RecordingRuntime(std::sync::Mutex<Vec<RuntimeRequest>>);

    #[async_trait]
    impl RuntimeChannel for RecordingRuntime {
        async fn send_message(&self, request: RuntimeRequest) -> Result<RuntimeReply, RelayError> {
            self.0.lock().unwrap().push(request);
            Err(RelayError::RuntimeUnavailable("recording only".to_string()))
        }
    }

    fn relay(config: Config, runtime: Arc<dyn RuntimeChannel>) -> (Relay, WindowBus) {
        let bus = WindowBus::new(ORIGIN);
        let document = Arc::new(StaticDocument::new(ORIGIN, None));
        let relay = Relay::new(config, bus.clone(), document, runtime, Arc::new(NoFavicon));
        (relay, bus)
    }

    fn call(uid: u64) -> RpcRequest {
        RpcRequest {
            uid: Uid(uid),
            protocol: Protocol::Ergo,
            function: "get_balance".to_string(),
            params: vec![json!("ERG")],
            origin: ORIGIN.to_string(),
            return_type: None,
        }
    }

    async fn next_response(listener: &mut WindowListener) -> RpcResponse {
        loop {
            if let PageMessage::RpcResponse(response) = listener.receive().await.unwrap() {
                return response;
            }
        }
    }

    #[tokio::test]
    async fn transport_failure_synthesizes_internal_error() {
        let (relay, bus) = relay(config(BuildFlavor::Prod), Arc::new(DeadRuntime));
        let mut page = bus.subscribe();

        relay.handle_rpc(call(7)).await;

        let response = next_response(&mut page).await;
        assert_eq!(response.uid, Uid(7));
        assert!(response
            .result
            .unwrap_err()
            .is_api(ApiErrorCode::InternalError));
        assert_eq!(relay.outstanding().await, 0);
    }

    #[tokio::test]
    async fn calls_carry_the_document_origin() {
        let runtime = Arc::new(RecordingRuntime::default());
        let (relay, _bus) = relay(config(BuildFlavor::Prod), runtime.clone());

        let mut spoofed = call(1);
        spoofed.origin = "https://other.example".to_string();
        relay.handle_rpc(spoofed).await;

        let mut is_enabled = call(2);
        is_enabled.function = "is_enabled/cardano".to_string();
        is_enabled.origin = "https://other.example".to_string();
        relay.handle_rpc(is_enabled).await;

        let seen = runtime.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|request| request.origin() == ORIGIN));
    }

    #[tokio::test]
    async fn failed_connect_is_reported_to_the_page() {
        let (relay, bus) = relay(config(BuildFlavor::Prod), Arc::new(DeadRuntime));
        let mut page = bus.subscribe();

        relay
            .handle_connect(Protocol::Cardano, ConnectRequest::default())
            .await;

        match page.receive().await.unwrap() {
            PageMessage::ConnectResponse { protocol, response } => {
                assert_eq!(protocol, Protocol::Cardano);
                assert!(!response.success);
                assert!(response.err.unwrap().is_api(ApiErrorCode::InternalError));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn broker_disconnect_reaches_matching_origin_only() {
        let (relay, bus) = relay(config(BuildFlavor::Prod), Arc::new(DeadRuntime));
        let mut page = bus.subscribe();

        relay
            .handle_broker_event(BrokerEvent::Disconnect {
                origin: "https://other.example".to_string(),
                protocol: Protocol::Cardano,
                reason: DisconnectReason::Revoked,
            })
            .await;
        relay
            .handle_broker_event(BrokerEvent::Disconnect {
                origin: ORIGIN.to_string(),
                protocol: Protocol::Ergo,
                reason: DisconnectReason::Revoked,
            })
            .await;

        assert_eq!(
            page.receive().await.unwrap(),
            PageMessage::Disconnect {
                protocol: Protocol::Ergo,
                reason: DisconnectReason::Revoked,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_disconnects_then_rejects() {
        let mut config = config(BuildFlavor::Prod);
        config.heartbeat_protocols = vec![Protocol::Ergo];
        let (relay, bus) = relay(config, Arc::new(HungRuntime));
        let mut page = bus.subscribe();
        let start = Instant::now();
        let _tasks = relay.start();

        let pending = {
            let relay = relay.clone();
            tokio::spawn(async move { relay.handle_rpc(call(1)).await })
        };

        loop {
            if let PageMessage::Disconnect { protocol, reason } = page.receive().await.unwrap() {
                assert_eq!(protocol, Protocol::Ergo);
                assert_eq!(reason, DisconnectReason::ConnectionLost);
                break;
            }
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));

        let response = next_response(&mut page).await;
        assert_eq!(response.uid, Uid(1));
        assert!(response.result.is_err());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));

        pending.abort();
    }

    #[tokio::test]
    async fn lower_precedence_build_does_not_inject() {
        let bus = WindowBus::new(ORIGIN);
        let document: Arc<dyn Document> = Arc::new(StaticDocument::new(ORIGIN, None));
        let realm = Realm::new(bus.clone(), document.clone());

        let dev = Relay::new(
            config(BuildFlavor::Dev),
            bus.clone(),
            document.clone(),
            Arc::new(DeadRuntime),
            Arc::new(NoFavicon),
        );
        let prod = Relay::new(
            config(BuildFlavor::Prod),
            bus,
            document,
            Arc::new(DeadRuntime),
            Arc::new(NoFavicon),
        );

        assert!(dev.inject(&realm).await.unwrap());
        assert!(!prod.inject(&realm).await.unwrap());
        assert_eq!(
            realm.cardano("yoroi").await.unwrap().flavor(),
            BuildFlavor::Dev
        );
    }
}
