//! Liveness of the background as seen from a page using the ergo API.

use colored::Colorize;
use dapp_connector::types::{
    error_codes::ApiErrorCode,
    injection::BuildFlavor,
    protocol::Protocol,
};
use dapp_connector_page::{EnableOptions, ErgoApi};
use dapp_connector_relay::Config as RelayConfig;
use serde_json::json;
use std::time::Duration;

use crate::{
    config::Config,
    error::Result,
    harness::{
        relay_config,
        reviewer::{approve, Reviews, ScriptedReviewer},
        Tab, World,
    },
    run_parallel,
    utils::{eventually, report_test_results, tagged_origin, TestResult},
};

const PERIOD: Duration = Duration::from_millis(20);

pub async fn run_tests(config: &Config) -> Result<Vec<TestResult>> {
    println!("{}", "Running heartbeat tests".cyan());

    let results = run_parallel!(
        config.clone(),
        healthy_background_keeps_the_connection(),
        lost_background_disconnects_then_fails_calls(),
        recovered_background_allows_reconnecting(),
    )?;

    println!("heartbeat tests: {}", report_test_results(&results));

    Ok(results)
}

fn heartbeat_config() -> RelayConfig {
    RelayConfig {
        heartbeat_period: PERIOD,
        disconnect_threshold: 3,
        reject_threshold: 5,
        heartbeat_protocols: vec![Protocol::Ergo],
        ..relay_config(BuildFlavor::Prod)
    }
}

async fn open_ergo(world: &World, reviews: &mut Reviews) -> Result<(Tab, ErgoApi)> {
    let tab = world
        .open_tab_with(&tagged_origin("dapp"), heartbeat_config())
        .await?;
    let connector = tab.ergo().await?;
    let connecting = tokio::spawn(async move { connector.request_read_access().await });
    reviews.next().await?.answer(approve());
    let api = connecting.await??;
    Ok((tab, api))
}

async fn healthy_background_keeps_the_connection() -> Result<()> {
    let (reviewer, mut reviews) = ScriptedReviewer::manual();
    let world = World::new(reviewer);
    let (_tab, api) = open_ergo(&world, &mut reviews).await?;

    tokio::time::sleep(PERIOD * 10).await;
    assert!(!api.is_disconnected().await);
    assert_eq!(api.ping().await?, json!(true));
    Ok(())
}

async fn lost_background_disconnects_then_fails_calls() -> Result<()> {
    let (reviewer, mut reviews) = ScriptedReviewer::manual();
    let world = World::new(reviewer);
    let (tab, api) = open_ergo(&world, &mut reviews).await?;

    let wallet = tab.cardano().await?;
    let enabling = tokio::spawn(async move { wallet.enable(EnableOptions::default()).await });
    reviews.next().await?.answer(approve());
    let cardano = enabling.await??;

    // A call parked at the broker when the background goes away.
    let signing = {
        let api = api.clone();
        tokio::spawn(async move { api.sign_tx(json!({ "inputs": [] })).await })
    };
    let _unanswered = reviews.next().await?;
    world.background.set_up(false);

    eventually("the page to be disconnected", || api.is_disconnected()).await?;
    let error = signing.await?.unwrap_err();
    assert!(error.is_api(ApiErrorCode::InternalError));
    assert_eq!(tab.relay.outstanding().await, 0);

    let error = api.get_balance(None).await.unwrap_err();
    assert!(error.is_api(ApiErrorCode::Refused));

    // Only protocols with a heartbeat are watched.
    assert!(!cardano.is_disconnected().await);
    Ok(())
}

async fn recovered_background_allows_reconnecting() -> Result<()> {
    let (reviewer, mut reviews) = ScriptedReviewer::manual();
    let world = World::new(reviewer);
    let (tab, api) = open_ergo(&world, &mut reviews).await?;

    world.background.set_up(false);
    eventually("the page to be disconnected", || api.is_disconnected()).await?;
    world.background.set_up(true);

    // The grant is still standing, so no popup this time.
    let fresh = tab.ergo().await?.request_read_access().await?;
    tokio::time::sleep(PERIOD * 10).await;
    assert!(!fresh.is_disconnected().await);
    assert!(api.is_disconnected().await);
    assert!(reviews.none_within(Duration::from_millis(10)).await);
    Ok(())
}
