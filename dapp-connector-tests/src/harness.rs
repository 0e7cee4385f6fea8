//! An in-process browser with the connector installed.

pub mod browser;
pub mod consent;
pub mod reviewer;
pub mod wallet;

use dapp_connector::{
    constants::DEFAULT_WALLET_NAME,
    infrastructure::channel::WindowBus,
    types::{
        ids::TabId,
        injection::{BuildFlavor, Document, StaticDocument},
        protocol::Protocol,
    },
};
use dapp_connector_broker::{Broker, Collaborators, Config as BrokerConfig, ConsentStore};
use dapp_connector_consent_hashmap::HashmapConsentStore;
use dapp_connector_page::{CardanoWallet, ErgoConnector, Realm};
use dapp_connector_relay::{favicon::NoFavicon, Config as RelayConfig, Relay, RelayTasks};
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::error::{ConnectorTestError, Result};
use browser::{Background, BrokerRuntime, PopupWindows, TabRouter};
use consent::RecordingConsentStore;
use reviewer::ScriptedReviewer;
use wallet::{CountingSigner, FixedWallet};

/// The wallet every approval in these tests connects with.
pub const WALLET_ID: &str = "wallet-1";

/// Relay settings with a heartbeat slow enough to never fire during a test.
pub fn relay_config(flavor: BuildFlavor) -> RelayConfig {
    RelayConfig {
        flavor,
        wallet_name: DEFAULT_WALLET_NAME.to_string(),
        wallet_icon: "data:image/png;base64,".to_string(),
        heartbeat_period: Duration::from_secs(60),
        disconnect_threshold: 15,
        reject_threshold: 30,
        heartbeat_protocols: Vec::new(),
        favicon_timeout: Duration::from_millis(100),
    }
}

pub struct World {
    pub broker: Broker,
    pub consent: Arc<RecordingConsentStore>,
    pub windows: Arc<PopupWindows>,
    pub signer: Arc<CountingSigner>,
    pub background: Background,
    tabs: Arc<TabRouter>,
    next_tab: AtomicU32,
}

impl World {
    pub fn new(reviewer: ScriptedReviewer) -> Self {
        Self::with_config(reviewer, BrokerConfig::default())
    }

    pub fn with_config(reviewer: ScriptedReviewer, config: BrokerConfig) -> Self {
        Self::with_store(reviewer, config, Arc::new(HashmapConsentStore::new()))
    }

    /// A world whose consent lives in `store`, e.g. one that outlives it.
    pub fn with_store(
        reviewer: ScriptedReviewer,
        config: BrokerConfig,
        store: Arc<dyn ConsentStore>,
    ) -> Self {
        let consent = Arc::new(RecordingConsentStore::new(store));
        let windows = Arc::new(PopupWindows::new(Arc::new(reviewer)));
        let signer = Arc::new(CountingSigner::default());
        let tabs = Arc::new(TabRouter::default());

        let broker = Broker::new(
            config,
            Collaborators {
                consent: consent.clone(),
                wallet: Arc::new(FixedWallet),
                signer: signer.clone(),
                windows: windows.clone(),
                tabs: tabs.clone(),
            },
        );
        windows.attach(broker.clone());

        Self {
            broker,
            consent,
            windows,
            signer,
            background: Background::default(),
            tabs,
            next_tab: AtomicU32::new(1),
        }
    }

    pub fn next_tab_id(&self) -> TabId {
        TabId(self.next_tab.fetch_add(1, Ordering::SeqCst))
    }

    /// `runtime.sendMessage` as seen from `tab_id`.
    pub fn runtime(&self, tab_id: TabId) -> Arc<BrokerRuntime> {
        Arc::new(BrokerRuntime::new(
            self.broker.clone(),
            tab_id,
            self.background.clone(),
        ))
    }

    /// Open `origin` in a new tab running a production build.
    pub async fn open_tab(&self, origin: &str) -> Result<Tab> {
        self.open_tab_with(origin, relay_config(BuildFlavor::Prod))
            .await
    }

    pub async fn open_tab_with(&self, origin: &str, config: RelayConfig) -> Result<Tab> {
        let tab_id = self.next_tab_id();
        let bus = WindowBus::new(origin);
        let document: Arc<dyn Document> = Arc::new(StaticDocument::new(origin, None));
        let realm = Realm::new(bus.clone(), document.clone());

        let relay = Relay::new(
            config,
            bus.clone(),
            document,
            self.runtime(tab_id),
            Arc::new(NoFavicon),
        );
        let _ = relay.inject(&realm).await?;
        let tasks = relay.start();
        self.tabs.register(tab_id, relay.clone());

        Ok(Tab {
            tab_id,
            bus,
            realm,
            relay,
            _tasks: tasks,
        })
    }

    /// `tabs.onRemoved`. The tab's page keeps running so tests can look at
    /// what it was told.
    pub async fn close_tab(&self, tab: &Tab) {
        let _ = self.tabs.unregister(tab.tab_id);
        self.broker.tab_removed(tab.tab_id).await;
    }
}

impl Drop for World {
    fn drop(&mut self) {
        // Broker, windows and relays refer to each other.
        self.windows.detach();
        self.tabs.clear();
    }
}

/// A page with the connector injected and its relay running.
pub struct Tab {
    pub tab_id: TabId,
    /// The page's `window`, for posting messages the installed API would not.
    pub bus: WindowBus,
    pub realm: Realm,
    pub relay: Relay,
    _tasks: RelayTasks,
}

impl Tab {
    pub async fn cardano(&self) -> Result<CardanoWallet> {
        self.realm
            .cardano(DEFAULT_WALLET_NAME)
            .await
            .ok_or(ConnectorTestError::MissingGlobal("cardano"))
    }

    pub async fn ergo(&self) -> Result<ErgoConnector> {
        self.realm
            .ergo()
            .await
            .ok_or(ConnectorTestError::MissingGlobal("ergo"))
    }

    pub async fn is_connected(&self, protocol: Protocol) -> bool {
        self.realm.is_connected(protocol).await
    }
}
