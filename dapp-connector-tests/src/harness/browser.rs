//! The browser around the connector: popup windows, tab messaging and the
//! runtime channel between a relay and the background.

use async_trait::async_trait;
use dapp_connector::types::{
    ids::{TabId, WindowId},
    message::{BrokerEvent, PopupMessage, PopupReply, PopupRoute, RuntimeReply, RuntimeRequest},
};
use dapp_connector_broker::{Broker, BrokerError, TabPort, WindowError, WindowGeometry, WindowManager};
use dapp_connector_popup::{BrokerPort, ConfirmationWindow, PopupError, WindowControl};
use dapp_connector_relay::{Relay, RelayError, RuntimeChannel};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
};
use tokio::task::JoinHandle;
use tracing::{info_span, warn};
use tracing_futures::Instrument;

use crate::{harness::reviewer::ScriptedReviewer, utils::lock};

#[derive(Default)]
struct WindowTable {
    opened: Vec<(WindowId, PopupRoute)>,
    closed: HashSet<WindowId>,
    popups: HashMap<WindowId, JoinHandle<()>>,
}

impl WindowTable {
    /// `true` the first time `window_id` is closed.
    fn close(&mut self, window_id: WindowId) -> (bool, Option<JoinHandle<()>>) {
        let newly_closed = self.closed.insert(window_id);
        (newly_closed, self.popups.remove(&window_id))
    }
}

/// `windows.create` opens a popup running a [`ConfirmationWindow`]; closing
/// one from either side reports `windows.onRemoved` to the broker.
pub struct PopupWindows {
    reviewer: Arc<ScriptedReviewer>,
    broker: Mutex<Option<Broker>>,
    next_id: AtomicU32,
    table: Arc<Mutex<WindowTable>>,
}

impl PopupWindows {
    pub fn new(reviewer: Arc<ScriptedReviewer>) -> Self {
        Self {
            reviewer,
            broker: Mutex::new(None),
            next_id: AtomicU32::new(1),
            table: Arc::new(Mutex::new(WindowTable::default())),
        }
    }

    /// Popups talk to `broker` from now on.
    pub fn attach(&self, broker: Broker) {
        *lock(&self.broker) = Some(broker);
    }

    /// Drop the broker handle and close every popup.
    pub fn detach(&self) {
        let _ = lock(&self.broker).take();
        for (_, popup) in lock(&self.table).popups.drain() {
            popup.abort();
        }
    }

    /// Every window opened so far, in order.
    pub fn opened(&self) -> Vec<(WindowId, PopupRoute)> {
        lock(&self.table).opened.clone()
    }

    pub fn open_count(&self) -> usize {
        let table = lock(&self.table);
        table.opened.len() - table.closed.len()
    }

    pub fn is_closed(&self, window_id: WindowId) -> bool {
        lock(&self.table).closed.contains(&window_id)
    }
}

#[async_trait]
impl WindowManager for PopupWindows {
    async fn open(
        &self,
        route: PopupRoute,
        _geometry: WindowGeometry,
    ) -> Result<WindowId, WindowError> {
        let broker = lock(&self.broker)
            .clone()
            .ok_or_else(|| WindowError("browser is shutting down".to_string()))?;
        let window_id = WindowId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let popup = ConfirmationWindow::new(
            window_id,
            route,
            Arc::new(BrokerLink(broker.clone())),
            self.reviewer.clone(),
            Arc::new(PopupCloser {
                broker,
                table: self.table.clone(),
            }),
        );

        let mut table = lock(&self.table);
        table.opened.push((window_id, route));
        let span = info_span!("popup", window_id = %window_id);
        let handle = tokio::spawn(
            async move {
                if let Err(e) = popup.run().await {
                    warn!("Popup failed: {}", e);
                }
            }
            .instrument(span),
        );
        let _ = table.popups.insert(window_id, handle);
        Ok(window_id)
    }

    /// `windows.remove` from the background. The broker may be holding its
    /// own lock, so the removal event is delivered from a separate task.
    async fn close(&self, window_id: WindowId) -> Result<(), WindowError> {
        let (newly_closed, popup) = lock(&self.table).close(window_id);
        if let Some(popup) = popup {
            popup.abort();
        }
        if !newly_closed {
            return Ok(());
        }
        if let Some(broker) = lock(&self.broker).clone() {
            let _ = tokio::spawn(async move { broker.window_removed(window_id).await });
        }
        Ok(())
    }
}

/// `runtime.sendMessage` from a popup.
struct BrokerLink(Broker);

#[async_trait]
impl BrokerPort for BrokerLink {
    async fn send(&self, message: PopupMessage) -> Result<PopupReply, PopupError> {
        Ok(self.0.handle_popup(message).await)
    }
}

/// `window.close()` from inside a popup.
struct PopupCloser {
    broker: Broker,
    table: Arc<Mutex<WindowTable>>,
}

#[async_trait]
impl WindowControl for PopupCloser {
    async fn close(&self, window_id: WindowId) -> Result<(), PopupError> {
        let (newly_closed, _own_task) = lock(&self.table).close(window_id);
        if newly_closed {
            self.broker.window_removed(window_id).await;
        }
        Ok(())
    }
}

/// `tabs.sendMessage`: delivers broker events to each tab's relay.
#[derive(Default)]
pub struct TabRouter {
    relays: Mutex<HashMap<TabId, Relay>>,
}

impl TabRouter {
    pub fn register(&self, tab_id: TabId, relay: Relay) {
        let _ = lock(&self.relays).insert(tab_id, relay);
    }

    pub fn unregister(&self, tab_id: TabId) -> Option<Relay> {
        lock(&self.relays).remove(&tab_id)
    }

    pub fn clear(&self) {
        lock(&self.relays).clear();
    }
}

#[async_trait]
impl TabPort for TabRouter {
    async fn notify(&self, tab_id: TabId, event: BrokerEvent) -> Result<(), BrokerError> {
        let relay = lock(&self.relays).get(&tab_id).cloned();
        match relay {
            Some(relay) => {
                relay.handle_broker_event(event).await;
                Ok(())
            }
            None => Err(BrokerError::TabGone(tab_id)),
        }
    }
}

/// Whether the background context is running. While it is down, pings fail
/// at once and every other message is never answered, as with a suspended
/// service worker.
#[derive(Debug, Clone)]
pub struct Background {
    up: Arc<AtomicBool>,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            up: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Background {
    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

/// One tab's `runtime.sendMessage`.
pub struct BrokerRuntime {
    broker: Broker,
    tab_id: TabId,
    background: Background,
}

impl BrokerRuntime {
    pub fn new(broker: Broker, tab_id: TabId, background: Background) -> Self {
        Self {
            broker,
            tab_id,
            background,
        }
    }
}

#[async_trait]
impl RuntimeChannel for BrokerRuntime {
    async fn send_message(&self, request: RuntimeRequest) -> Result<RuntimeReply, RelayError> {
        if !self.background.is_up() {
            return match request {
                RuntimeRequest::Ping { .. } => Err(RelayError::RuntimeUnavailable(
                    "background is not running".to_string(),
                )),
                _ => futures::future::pending().await,
            };
        }
        Ok(self.broker.handle_runtime(self.tab_id, request).await)
    }
}
