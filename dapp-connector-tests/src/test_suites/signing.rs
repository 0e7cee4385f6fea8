//! Signing and submission through the confirmation popup.

use colored::Colorize;
use dapp_connector::types::{
    connection::ConnectionState,
    error_codes::{DataSignErrorCode, TxSendErrorCode, TxSignErrorCode},
    message::PopupRoute,
    protocol::Protocol,
};
use dapp_connector_broker::Config as BrokerConfig;
use dapp_connector_page::{CardanoApi, EnableOptions};
use dapp_connector_popup::{Choice, View};
use serde_json::json;
use std::time::Duration;

use crate::{
    config::Config,
    error::Result,
    harness::{
        reviewer::{approve, Reviews, ScriptedReviewer},
        Tab, World,
    },
    run_parallel,
    utils::{report_test_results, tagged_origin, TestResult},
};

pub async fn run_tests(config: &Config) -> Result<Vec<TestResult>> {
    println!("{}", "Running signing tests".cyan());

    let results = run_parallel!(
        config.clone(),
        closed_signing_popup_is_a_decline(),
        approved_signing_returns_the_signature(),
        declined_data_signing_uses_its_own_code(),
        declined_submit_is_refused(),
        submit_can_skip_confirmation(),
        signing_requests_wait_their_turn(),
        closing_the_tab_rejects_pending_signing(),
        undecided_signing_expires(),
        ergo_signs_single_inputs(),
    )?;

    println!("signing tests: {}", report_test_results(&results));

    Ok(results)
}

/// Connect a fresh tab, approving the popup through `reviews`.
async fn connect_manually(world: &World, reviews: &mut Reviews) -> Result<(Tab, CardanoApi)> {
    let tab = world.open_tab(&tagged_origin("dapp")).await?;
    let wallet = tab.cardano().await?;
    let enabling = tokio::spawn(async move { wallet.enable(EnableOptions::default()).await });
    reviews.next().await?.answer(approve());
    let api = enabling.await??;
    Ok((tab, api))
}

async fn closed_signing_popup_is_a_decline() -> Result<()> {
    let world = World::new(ScriptedReviewer::sequence(vec![approve()], Choice::Dismiss));
    let origin = tagged_origin("dapp");
    let tab = world.open_tab(&origin).await?;
    let api = tab.cardano().await?.enable(EnableOptions::default()).await?;

    let error = api.sign_tx("84a400", false).await.unwrap_err();
    assert_eq!(error.code, TxSignErrorCode::UserDeclined.code());

    // Declining one request leaves the connection alone.
    assert!(!api.is_disconnected().await);
    assert_eq!(
        world.consent.state(&origin, Protocol::Cardano).await?,
        ConnectionState::Connected
    );
    assert_eq!(api.get_network_id().await?, json!(1));
    assert_eq!(world.signer.signed(), 0);
    Ok(())
}

async fn approved_signing_returns_the_signature() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(approve()));
    let tab = world.open_tab(&tagged_origin("dapp")).await?;
    let api = tab.cardano().await?.enable(EnableOptions::default()).await?;

    let signed = api.sign_data("addr_used0", "cafe").await?;
    assert_eq!(signed["signed"]["payload"], json!("cafe"));
    assert_eq!(signed["signed"]["address"], json!("addr_used0"));

    let signed = api.sign_tx("84a400", true).await?;
    assert_eq!(signed["signed"], json!("84a400"));

    let routes: Vec<_> = world
        .windows
        .opened()
        .into_iter()
        .map(|(_, route)| route)
        .collect();
    assert_eq!(
        routes,
        vec![PopupRoute::Connect, PopupRoute::Sign, PopupRoute::Sign]
    );
    assert_eq!(world.signer.signed(), 2);
    Ok(())
}

async fn declined_data_signing_uses_its_own_code() -> Result<()> {
    let world = World::new(ScriptedReviewer::sequence(vec![approve()], Choice::Reject));
    let tab = world.open_tab(&tagged_origin("dapp")).await?;
    let api = tab.cardano().await?.enable(EnableOptions::default()).await?;

    let error = api.sign_data("addr_used0", "cafe").await.unwrap_err();
    assert_eq!(error.code, DataSignErrorCode::UserDeclined.code());

    let error = api.cip95().sign_data("addr_used0", "cafe").await.unwrap_err();
    assert_eq!(error.code, DataSignErrorCode::UserDeclined.code());
    Ok(())
}

async fn declined_submit_is_refused() -> Result<()> {
    let world = World::new(ScriptedReviewer::sequence(vec![approve()], Choice::Reject));
    let tab = world.open_tab(&tagged_origin("dapp")).await?;
    let api = tab.cardano().await?.enable(EnableOptions::default()).await?;

    let error = api.submit_tx("84a400").await.unwrap_err();
    assert_eq!(error.code, TxSendErrorCode::Refused.code());
    assert_eq!(world.signer.submitted(), 0);
    Ok(())
}

async fn submit_can_skip_confirmation() -> Result<()> {
    let config = BrokerConfig {
        confirm_submit: false,
        ..Default::default()
    };
    let world = World::with_config(ScriptedReviewer::always(approve()), config);
    let tab = world.open_tab(&tagged_origin("dapp")).await?;
    let api = tab.cardano().await?.enable(EnableOptions::default()).await?;

    assert_eq!(api.submit_tx("84a400").await?, json!("txhash-0"));
    assert_eq!(world.windows.opened().len(), 1);
    Ok(())
}

async fn signing_requests_wait_their_turn() -> Result<()> {
    let (reviewer, mut reviews) = ScriptedReviewer::manual();
    let world = World::new(reviewer);
    let (_tab, api) = connect_manually(&world, &mut reviews).await?;

    let first = {
        let api = api.clone();
        tokio::spawn(async move { api.sign_data("addr_used0", "01").await })
    };
    let review = reviews.next().await?;
    let second = {
        let api = api.clone();
        tokio::spawn(async move { api.sign_data("addr_used0", "02").await })
    };

    // One popup per tab at a time.
    assert!(reviews.none_within(Duration::from_millis(100)).await);
    assert_eq!(world.windows.opened().len(), 2);
    match &review.view {
        View::Signing(view) => assert!(view.details.contains("01")),
        View::Connect(_) => panic!("expected a signing popup"),
    }
    review.answer(approve());

    let review = reviews.next().await?;
    match &review.view {
        View::Signing(view) => assert!(view.details.contains("02")),
        View::Connect(_) => panic!("expected a signing popup"),
    }
    review.answer(approve());

    assert_eq!(first.await??["signed"]["payload"], json!("01"));
    assert_eq!(second.await??["signed"]["payload"], json!("02"));
    assert_eq!(world.windows.opened().len(), 3);
    Ok(())
}

async fn closing_the_tab_rejects_pending_signing() -> Result<()> {
    let (reviewer, mut reviews) = ScriptedReviewer::manual();
    let world = World::new(reviewer);
    let (tab, api) = connect_manually(&world, &mut reviews).await?;

    let signing = tokio::spawn(async move { api.sign_tx("84a400", false).await });
    let _unanswered = reviews.next().await?;
    let (window_id, route) = world.windows.opened()[1];
    assert_eq!(route, PopupRoute::Sign);

    world.close_tab(&tab).await;

    let error = signing.await?.unwrap_err();
    assert_eq!(error.code, TxSignErrorCode::UserDeclined.code());
    assert!(world.windows.is_closed(window_id));
    assert_eq!(world.signer.signed(), 0);
    Ok(())
}

async fn undecided_signing_expires() -> Result<()> {
    let config = BrokerConfig {
        decision_timeout: Some(Duration::from_millis(200)),
        ..Default::default()
    };
    let (reviewer, mut reviews) = ScriptedReviewer::manual();
    let world = World::with_config(reviewer, config);
    let (_tab, api) = connect_manually(&world, &mut reviews).await?;

    let signing = {
        let api = api.clone();
        tokio::spawn(async move { api.sign_tx("84a400", false).await })
    };
    let _unanswered = reviews.next().await?;

    let error = signing.await?.unwrap_err();
    assert_eq!(error.code, TxSignErrorCode::UserDeclined.code());
    assert!(world.windows.is_closed(world.windows.opened()[1].0));

    // The connection survives the expiry.
    assert_eq!(api.get_network_id().await?, json!(1));
    Ok(())
}

async fn ergo_signs_single_inputs() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(approve()));
    let tab = world.open_tab(&tagged_origin("dapp")).await?;
    let ergo = tab.ergo().await?;
    assert!(!ergo.check_read_access().await?);

    let api = ergo.request_read_access().await?;
    assert!(ergo.check_read_access().await?);
    assert_eq!(api.ping().await?, json!(true));

    let signed = api.sign_tx_input(json!({ "inputs": [] }), 0).await?;
    assert_eq!(signed["signed"]["index"], json!(0));

    let balance = api.get_balance(None).await?;
    assert_eq!(balance["token"], json!("ERG"));
    Ok(())
}
