//! Consent kept in a file outlives the broker that wrote it.

use colored::Colorize;
use dapp_connector::types::{connection::ConnectionState, error_codes::ApiErrorCode, protocol::Protocol};
use dapp_connector_broker::{Config as BrokerConfig, ConsentStore};
use dapp_connector_consent_json::{Config as JsonConfig, JsonConsentStore};
use dapp_connector_page::EnableOptions;
use dapp_connector_popup::Choice;
use serde_json::json;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use uuid::Uuid;

use crate::{
    config::Config,
    error::Result,
    harness::{
        reviewer::{approve, ScriptedReviewer},
        World,
    },
    run_parallel,
    utils::{report_test_results, tagged_origin, TestResult},
};

pub async fn run_tests(config: &Config) -> Result<Vec<TestResult>> {
    println!("{}", "Running persistence tests".cyan());

    let results = run_parallel!(
        config.clone(),
        grants_survive_a_restart(),
        revocations_survive_a_restart(),
    )?;

    println!("persistence tests: {}", report_test_results(&results));

    Ok(results)
}

fn temp_store_path() -> PathBuf {
    std::env::temp_dir().join(format!("dapp-connector-consent-{}.json", Uuid::new_v4()))
}

async fn open_store(path: &Path) -> Result<Arc<dyn ConsentStore>> {
    let store = JsonConsentStore::open(JsonConfig { path: path.to_path_buf() }).await?;
    Ok(Arc::new(store))
}

/// Connect `origin` in a broker backed by the file at `path`.
async fn connect_once(path: &Path, origin: &str) -> Result<()> {
    let world = World::with_store(
        ScriptedReviewer::always(approve()),
        BrokerConfig::default(),
        open_store(path).await?,
    );
    let tab = world.open_tab(origin).await?;
    let _ = tab.cardano().await?.enable(EnableOptions::default()).await?;
    Ok(())
}

async fn grants_survive_a_restart() -> Result<()> {
    let path = temp_store_path();
    let origin = tagged_origin("dapp");
    connect_once(&path, &origin).await?;

    // Anyone asking again would be turned away.
    let world = World::with_store(
        ScriptedReviewer::always(Choice::Reject),
        BrokerConfig::default(),
        open_store(&path).await?,
    );
    let tab = world.open_tab(&origin).await?;
    let api = tab
        .cardano()
        .await?
        .enable(EnableOptions {
            only_silent: true,
            ..Default::default()
        })
        .await?;
    assert_eq!(api.get_network_id().await?, json!(1));
    assert!(world.windows.opened().is_empty());

    tokio::fs::remove_file(&path).await?;
    Ok(())
}

async fn revocations_survive_a_restart() -> Result<()> {
    let path = temp_store_path();
    let origin = tagged_origin("dapp");
    connect_once(&path, &origin).await?;

    {
        let world = World::with_store(
            ScriptedReviewer::always(Choice::Reject),
            BrokerConfig::default(),
            open_store(&path).await?,
        );
        assert!(world.broker.revoke(&origin, Protocol::Cardano).await?);
    }

    let world = World::with_store(
        ScriptedReviewer::always(Choice::Reject),
        BrokerConfig::default(),
        open_store(&path).await?,
    );
    assert_eq!(
        world.consent.state(&origin, Protocol::Cardano).await?,
        ConnectionState::Disconnected
    );
    let tab = world.open_tab(&origin).await?;
    let error = tab
        .cardano()
        .await?
        .enable(EnableOptions {
            only_silent: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(error.is_api(ApiErrorCode::Refused));

    tokio::fs::remove_file(&path).await?;
    Ok(())
}
