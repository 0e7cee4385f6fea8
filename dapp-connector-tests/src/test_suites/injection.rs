//! Which build gets to install the wallet globals when several are present.

use colored::Colorize;
use dapp_connector::{
    constants::DEFAULT_WALLET_NAME,
    infrastructure::channel::WindowBus,
    types::{
        injection::{BuildFlavor, Document, StaticDocument},
        message::PageMessage,
    },
};
use dapp_connector_page::{EnableOptions, Realm};
use dapp_connector_relay::{favicon::NoFavicon, Relay};
use std::sync::Arc;

use crate::{
    config::Config,
    error::{ConnectorTestError, Result},
    harness::{relay_config, reviewer::{approve, ScriptedReviewer}, World},
    run_parallel,
    utils::{eventually, report_test_results, tagged_origin, TestResult},
};

pub async fn run_tests(config: &Config) -> Result<Vec<TestResult>> {
    println!("{}", "Running injection tests".cyan());

    let results = run_parallel!(
        config.clone(),
        dev_build_keeps_precedence_over_prod(),
        higher_build_replaces_lower(),
        same_build_may_reinject(),
        injected_page_announces_itself(),
    )?;

    println!("injection tests: {}", report_test_results(&results));

    Ok(results)
}

/// One page and the relays of several installed builds.
struct Page {
    world: World,
    bus: WindowBus,
    document: Arc<StaticDocument>,
    realm: Realm,
}

impl Page {
    fn new() -> Self {
        let world = World::new(ScriptedReviewer::always(approve()));
        let origin = tagged_origin("dapp");
        let bus = WindowBus::new(origin.clone());
        let document = Arc::new(StaticDocument::new(origin, None));
        let realm = Realm::new(bus.clone(), document.clone());
        Self {
            world,
            bus,
            document,
            realm,
        }
    }

    fn relay(&self, flavor: BuildFlavor) -> Relay {
        let tab_id = self.world.next_tab_id();
        Relay::new(
            relay_config(flavor),
            self.bus.clone(),
            self.document.clone(),
            self.world.runtime(tab_id),
            Arc::new(NoFavicon),
        )
    }

    async fn installed_flavor(&self) -> Result<BuildFlavor> {
        let wallet = self
            .realm
            .cardano(DEFAULT_WALLET_NAME)
            .await
            .ok_or(ConnectorTestError::MissingGlobal("cardano"))?;
        Ok(wallet.flavor())
    }
}

async fn dev_build_keeps_precedence_over_prod() -> Result<()> {
    let page = Page::new();

    assert!(page.relay(BuildFlavor::Dev).inject(&page.realm).await?);
    assert!(!page.relay(BuildFlavor::Prod).inject(&page.realm).await?);

    assert_eq!(page.installed_flavor().await?, BuildFlavor::Dev);
    assert_eq!(
        page.document.injection_marker().map(|marker| marker.flavor),
        Some(BuildFlavor::Dev)
    );
    Ok(())
}

async fn higher_build_replaces_lower() -> Result<()> {
    let page = Page::new();

    assert!(page.relay(BuildFlavor::Prod).inject(&page.realm).await?);
    assert!(page.relay(BuildFlavor::Nightly).inject(&page.realm).await?);

    assert_eq!(page.installed_flavor().await?, BuildFlavor::Nightly);
    let ergo = page
        .realm
        .ergo()
        .await
        .ok_or(ConnectorTestError::MissingGlobal("ergo"))?;
    assert_eq!(ergo.flavor(), BuildFlavor::Nightly);
    Ok(())
}

async fn same_build_may_reinject() -> Result<()> {
    let page = Page::new();

    assert!(page.relay(BuildFlavor::Nightly).inject(&page.realm).await?);
    assert!(page.relay(BuildFlavor::Nightly).inject(&page.realm).await?);
    assert_eq!(page.installed_flavor().await?, BuildFlavor::Nightly);
    Ok(())
}

async fn injected_page_announces_itself() -> Result<()> {
    let page = Page::new();
    let relay = page.relay(BuildFlavor::Prod);
    let _tasks = relay.start();
    let mut listener = page.bus.subscribe();

    assert!(relay.inject(&page.realm).await?);
    assert_eq!(listener.receive().await?, PageMessage::ScriptInjected);
    eventually("the relay to see the page", || relay.is_injected()).await?;

    // The installed build answers the page end to end.
    let api = page
        .realm
        .cardano(DEFAULT_WALLET_NAME)
        .await
        .ok_or(ConnectorTestError::MissingGlobal("cardano"))?
        .enable(EnableOptions::default())
        .await?;
    assert!(!api.is_disconnected().await);
    Ok(())
}
