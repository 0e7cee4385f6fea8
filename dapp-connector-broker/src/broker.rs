mod connect;
mod context;
mod operation;
mod signing;

pub(crate) use context::Context;
pub(crate) use operation::Operation;

use dapp_connector::{
    constants::span_fields,
    infrastructure::logging::record_field,
    types::{
        capability::{parse_is_enabled, Function},
        connection::{ConnectionEvent, ConnectionRecord},
        ids::{TabId, WalletId, WindowId},
        message::{
            BrokerEvent, ConnectResponse, DisconnectReason, PopupMessage, PopupReply,
            RuntimeReply, RuntimeRequest,
        },
        protocol::Protocol,
        rpc::{RpcRequest, RpcResponse},
        signing::Decision,
    },
};
use futures::future::join_all;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    operations::{Auth, Ping, Query, Sign, Submit},
    BrokerError, Config, ConsentStore, Signer, TabPort, WalletStore, WindowManager,
};

use self::{connect::ConnectPromptState, signing::TabSigning};

/// Everything the broker talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub consent: Arc<dyn ConsentStore>,
    pub wallet: Arc<dyn WalletStore>,
    pub signer: Arc<dyn Signer>,
    pub windows: Arc<dyn WindowManager>,
    pub tabs: Arc<dyn TabPort>,
}

#[derive(Default)]
pub(crate) struct BrokerState {
    /// Open connect windows.
    prompts: HashMap<WindowId, ConnectPromptState>,
    /// The connect window already open for an origin, shared by every tab
    /// asking on its behalf.
    pending_connects: HashMap<(String, Protocol), WindowId>,
    signing: HashMap<TabId, TabSigning>,
    sign_windows: HashMap<WindowId, TabId>,
    /// Tabs to notify when an origin is disconnected.
    subscriptions: HashMap<(String, Protocol), HashSet<TabId>>,
}

impl BrokerState {
    fn subscribe(&mut self, origin: &str, protocol: Protocol, tab_id: TabId) {
        let _ = self
            .subscriptions
            .entry((origin.to_string(), protocol))
            .or_default()
            .insert(tab_id);
    }
}

pub(crate) struct BrokerInner {
    config: Config,
    collaborators: Collaborators,
    state: Mutex<BrokerState>,
}

/// The background broker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Broker {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                config,
                collaborators,
                state: Mutex::new(BrokerState::default()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    fn consent(&self) -> &dyn ConsentStore {
        self.inner.collaborators.consent.as_ref()
    }

    async fn load_record(
        &self,
        origin: &str,
        protocol: Protocol,
    ) -> Result<ConnectionRecord, BrokerError> {
        Ok(self
            .consent()
            .find_record(origin, protocol)
            .await?
            .unwrap_or_else(|| ConnectionRecord::new(origin, protocol)))
    }

    /// Entry point for `runtime.onMessage` from a tab's relay.
    #[instrument(skip_all, fields(request_id, origin, tab_id = %tab_id))]
    pub async fn handle_runtime(&self, tab_id: TabId, request: RuntimeRequest) -> RuntimeReply {
        record_field(span_fields::REQUEST_ID, &Uuid::new_v4());
        record_field(span_fields::ORIGIN, &request.origin());

        match request {
            RuntimeRequest::Connect {
                protocol,
                origin,
                request_identification,
                only_silent,
                favicon,
            } => {
                let response = self
                    .connect(
                        tab_id,
                        protocol,
                        origin,
                        request_identification,
                        only_silent,
                        favicon,
                    )
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Connect failed: {:?}", e);
                        ConnectResponse::refused(e.into())
                    });
                RuntimeReply::Connect(response)
            }
            RuntimeRequest::IsEnabled { protocol, origin } => RuntimeReply::IsEnabled {
                enabled: self.is_enabled(&origin, protocol).await,
            },
            RuntimeRequest::Rpc(request) => RuntimeReply::Rpc(self.handle_rpc(tab_id, request).await),
            RuntimeRequest::Ping { .. } => RuntimeReply::Pong,
        }
    }

    /// Whether `origin` currently holds a grant. Storage failures read as
    /// `false`.
    pub async fn is_enabled(&self, origin: &str, protocol: Protocol) -> bool {
        match self.consent().find_record(origin, protocol).await {
            Ok(record) => record.map_or(false, |r| r.is_connected()),
            Err(e) => {
                warn!("Consent lookup failed: {}", e);
                false
            }
        }
    }

    /// Validate and dispatch one call. Never fails: every error becomes the
    /// `err` of the response.
    #[instrument(skip_all, fields(uid = %request.uid, function = %request.function))]
    pub async fn handle_rpc(&self, tab_id: TabId, request: RpcRequest) -> RpcResponse {
        let uid = request.uid;

        // Pages ask for isEnabled over the RPC channel too.
        if let Some(protocol) = parse_is_enabled(&request.function) {
            let enabled = self.is_enabled(&request.origin, protocol).await;
            return RpcResponse::ok(uid, enabled.into());
        }

        match self.prepare(tab_id, request).await {
            Ok((function, context)) => dispatch(function, context).await,
            Err(e) => {
                info!("Rejected call before dispatch: {}", e);
                RpcResponse::err(uid, e.into())
            }
        }
    }

    /// Everything that must hold before a handler runs: the origin is
    /// connected, and the call names a known function with a valid number of
    /// parameters. Nothing is created or changed if this fails.
    async fn prepare(
        &self,
        tab_id: TabId,
        request: RpcRequest,
    ) -> Result<(Function, Context), BrokerError> {
        let record = self.load_record(&request.origin, request.protocol).await?;
        let wallet_id = match (&record.wallet_id, record.is_connected()) {
            (Some(wallet_id), true) => wallet_id.clone(),
            _ => return Err(BrokerError::NotConnected),
        };

        let function = Function::parse(request.protocol, &request.function)?;
        function.check_arity(request.params.len())?;

        self.inner
            .state
            .lock()
            .await
            .subscribe(&request.origin, request.protocol, tab_id);

        let context = Context::new(self.clone(), tab_id, wallet_id, record.auth, request);
        Ok((function, context))
    }

    /// Entry point for messages from a confirmation popup.
    #[instrument(skip_all, fields(request_id))]
    pub async fn handle_popup(&self, message: PopupMessage) -> PopupReply {
        record_field(span_fields::REQUEST_ID, &Uuid::new_v4());

        match message {
            PopupMessage::ConnectRetrieveData { window_id } => PopupReply::ConnectData {
                prompt: self.connect_prompt(window_id).await,
            },
            PopupMessage::ConnectResponse {
                window_id,
                accepted,
                wallet_id,
            } => {
                let wallet_id = wallet_id.filter(|_| accepted);
                self.resolve_connect(window_id, wallet_id).await;
                PopupReply::Ack
            }
            PopupMessage::TxSignWindowRetrieveData { window_id } => PopupReply::SigningData {
                request: self.signing_request(window_id).await,
            },
            PopupMessage::SignConfirmed {
                window_id,
                uid,
                tab_id,
            } => {
                let _ = self
                    .decide_in_window(window_id, tab_id, uid, Decision::Confirmed)
                    .await;
                PopupReply::Ack
            }
            PopupMessage::SignRejected {
                window_id,
                uid,
                tab_id,
            } => {
                let _ = self
                    .decide_in_window(window_id, tab_id, uid, Decision::Rejected)
                    .await;
                PopupReply::Ack
            }
        }
    }

    /// `windows.onRemoved`. A window closed without a decision rejects
    /// whatever it was showing.
    #[instrument(skip(self))]
    pub async fn window_removed(&self, window_id: WindowId) {
        self.resolve_connect(window_id, None).await;
        self.sign_window_removed(window_id).await;
    }

    /// `tabs.onRemoved`. Pending signings of the tab are rejected and their
    /// windows closed.
    #[instrument(skip(self))]
    pub async fn tab_removed(&self, tab_id: TabId) {
        let windows = {
            let mut state = self.inner.state.lock().await;
            for tabs in state.subscriptions.values_mut() {
                let _ = tabs.remove(&tab_id);
            }
            for prompt in state.prompts.values_mut() {
                prompt.remove_tab(tab_id);
            }
            signing::reject_tab(&mut state, tab_id)
        };
        self.close_windows(windows).await;
    }

    /// Revoke `origin`'s grant from wallet settings.
    #[instrument(skip(self), err(Debug))]
    pub async fn revoke(&self, origin: &str, protocol: Protocol) -> Result<bool, BrokerError> {
        self.disconnect_origin(origin, protocol, DisconnectReason::Revoked)
            .await
    }

    /// Disconnect every origin connected with `wallet_id`, e.g. on an account
    /// switch. Returns how many origins were disconnected.
    #[instrument(skip(self), err(Debug))]
    pub async fn disconnect_wallet(&self, wallet_id: &WalletId) -> Result<usize, BrokerError> {
        let records = self.consent().list_records().await?;
        let mut disconnected = 0;
        for record in records
            .into_iter()
            .filter(|r| r.is_connected() && r.wallet_id.as_ref() == Some(wallet_id))
        {
            if self
                .disconnect_origin(
                    &record.origin,
                    record.protocol,
                    DisconnectReason::WalletDisconnected,
                )
                .await?
            {
                disconnected += 1;
            }
        }
        Ok(disconnected)
    }

    async fn disconnect_origin(
        &self,
        origin: &str,
        protocol: Protocol,
        reason: DisconnectReason,
    ) -> Result<bool, BrokerError> {
        let tabs = {
            let mut state = self.inner.state.lock().await;
            let mut record = self.load_record(origin, protocol).await?;
            if !record.is_connected() {
                return Ok(false);
            }
            let _ = record.apply(ConnectionEvent::Revoked)?;
            self.consent().save_record(&record).await?;
            state
                .subscriptions
                .remove(&(origin.to_string(), protocol))
                .unwrap_or_default()
        };

        info!("Disconnected {} for {} ({} tab(s)).", origin, protocol, tabs.len());
        let event = BrokerEvent::Disconnect {
            origin: origin.to_string(),
            protocol,
            reason,
        };
        let notifications = tabs.into_iter().map(|tab_id| {
            let event = event.clone();
            async move {
                if let Err(e) = self.inner.collaborators.tabs.notify(tab_id, event).await {
                    warn!("Could not notify tab {}: {}", tab_id, e);
                }
            }
        });
        let _ = join_all(notifications).await;
        Ok(true)
    }

    async fn close_windows(&self, windows: Vec<WindowId>) {
        for window_id in windows {
            if let Err(e) = self.inner.collaborators.windows.close(window_id).await {
                warn!("Closing window {} failed: {}", window_id, e);
            }
        }
    }
}

async fn dispatch(function: Function, context: Context) -> RpcResponse {
    use dapp_connector::types::capability::{CardanoFunction as C, ErgoFunction as E};

    match function {
        Function::Cardano(C::Ping) | Function::Ergo(E::Ping) => Ping.handle_request(context).await,
        Function::Cardano(C::SubmitTx) | Function::Ergo(E::SubmitTx) => {
            Submit.handle_request(context).await
        }
        Function::Cardano(C::AuthSignHexPayload | C::AuthCheckHexPayload) => {
            Auth { function }.handle_request(context).await
        }
        _ => match function.signing_kind() {
            Some(kind) => Sign { function, kind }.handle_request(context).await,
            None => Query { function }.handle_request(context).await,
        },
    }
}

#[cfg(test)]
mod tests;
