//! Connecting, standing grants and revocation across tabs.

use colored::Colorize;
use dapp_connector::types::{
    capability::API_VERSION,
    connection::ConnectionState,
    error_codes::ApiErrorCode,
    message::{PageMessage, PopupRoute},
    protocol::Protocol,
    rpc::{RpcRequest, Uid},
};
use dapp_connector_page::EnableOptions;
use dapp_connector_popup::{Choice, View};
use serde_json::json;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    config::Config,
    error::{ConnectorTestError, Result},
    harness::{
        reviewer::{approve, ScriptedReviewer},
        World, WALLET_ID,
    },
    run_parallel,
    utils::{eventually, report_test_results, tagged_origin, TestResult, EVENTUALLY_TIMEOUT},
};

pub async fn run_tests(config: &Config) -> Result<Vec<TestResult>> {
    println!("{}", "Running connect tests".cyan());

    let results = run_parallel!(
        config.clone(),
        approved_connect_grants_access(),
        another_origin_cannot_borrow_a_grant(),
        standing_grant_skips_the_popup(),
        silent_enable_without_grant_is_refused(),
        rejected_connect_is_refused(),
        dismissed_connect_is_refused(),
        concurrent_enables_share_one_popup(),
        identification_is_disclosed_when_requested(),
        revoke_disconnects_every_tab(),
        wallet_switch_disconnects_its_origins(),
    )?;

    println!("connect tests: {}", report_test_results(&results));

    Ok(results)
}

async fn approved_connect_grants_access() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(approve()));
    let origin = tagged_origin("dapp");
    let tab = world.open_tab(&origin).await?;

    let wallet = tab.cardano().await?;
    assert_eq!(wallet.api_version(), API_VERSION);
    assert!(!wallet.is_enabled().await?);

    let api = wallet.enable(EnableOptions::default()).await?;
    let balance = api.get_balance(None).await?;
    assert_eq!(balance["token"], json!("*"));
    assert_eq!(balance["wallet"], json!(WALLET_ID));

    assert!(wallet.is_enabled().await?);
    assert!(tab.is_connected(Protocol::Cardano).await);
    assert_eq!(
        world.consent.state(&origin, Protocol::Cardano).await?,
        ConnectionState::Connected
    );
    let opened = world.windows.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].1, PopupRoute::Connect);
    assert!(world.consent.illegal_transitions().is_empty());

    Ok(())
}

async fn another_origin_cannot_borrow_a_grant() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(approve()));
    let origin = tagged_origin("dapp");
    let tab = world.open_tab(&origin).await?;
    let _ = tab.cardano().await?.enable(EnableOptions::default()).await?;

    // A second site posts a raw call naming the first site as its origin.
    let intruder = world.open_tab(&tagged_origin("intruder")).await?;
    let mut page = intruder.bus.subscribe();
    intruder.bus.post_message(&PageMessage::RpcRequest(RpcRequest {
        uid: Uid(999),
        protocol: Protocol::Cardano,
        function: "get_balance".to_string(),
        params: Vec::new(),
        origin: origin.clone(),
        return_type: None,
    }))?;

    let response = tokio::time::timeout(EVENTUALLY_TIMEOUT, async {
        loop {
            if let PageMessage::RpcResponse(response) = page.receive().await? {
                if response.uid == Uid(999) {
                    return Ok::<_, ConnectorTestError>(response);
                }
            }
        }
    })
    .await
    .map_err(|_| ConnectorTestError::Timeout("the intruder's response"))??;

    let error = response.result.unwrap_err();
    assert!(error.is_api(ApiErrorCode::Refused));
    assert_eq!(
        world.consent.state(&origin, Protocol::Cardano).await?,
        ConnectionState::Connected
    );
    assert_eq!(world.windows.opened().len(), 1);
    Ok(())
}

async fn standing_grant_skips_the_popup() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(approve()));
    let origin = tagged_origin("dapp");
    let first = world.open_tab(&origin).await?;
    let _ = first.cardano().await?.enable(EnableOptions::default()).await?;

    // Same tab again, then a silent enable from a second tab.
    let _ = first.cardano().await?.enable(EnableOptions::default()).await?;
    let second = world.open_tab(&origin).await?;
    let api = second
        .cardano()
        .await?
        .enable(EnableOptions {
            only_silent: true,
            ..Default::default()
        })
        .await?;
    assert_eq!(api.get_network_id().await?, json!(1));

    assert_eq!(world.windows.opened().len(), 1);
    Ok(())
}

async fn silent_enable_without_grant_is_refused() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(approve()));
    let origin = tagged_origin("dapp");
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

    assert!(world.windows.opened().is_empty());
    assert_eq!(
        world.consent.state(&origin, Protocol::Cardano).await?,
        ConnectionState::Disconnected
    );
    Ok(())
}

async fn rejected_connect_is_refused() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(Choice::Reject));
    let origin = tagged_origin("dapp");
    let tab = world.open_tab(&origin).await?;

    let wallet = tab.cardano().await?;
    let error = wallet.enable(EnableOptions::default()).await.unwrap_err();
    assert!(error.is_api(ApiErrorCode::Refused));
    assert!(!wallet.is_enabled().await?);
    assert!(!tab.is_connected(Protocol::Cardano).await);

    assert_eq!(
        world.consent.state(&origin, Protocol::Cardano).await?,
        ConnectionState::Disconnected
    );
    assert!(world.consent.illegal_transitions().is_empty());
    Ok(())
}

async fn dismissed_connect_is_refused() -> Result<()> {
    let world = World::new(ScriptedReviewer::sequence(vec![Choice::Dismiss], approve()));
    let origin = tagged_origin("dapp");
    let tab = world.open_tab(&origin).await?;
    let wallet = tab.cardano().await?;

    let error = wallet.enable(EnableOptions::default()).await.unwrap_err();
    assert!(error.is_api(ApiErrorCode::Refused));

    // A later request opens a fresh popup.
    let _ = wallet.enable(EnableOptions::default()).await?;
    assert_eq!(world.windows.opened().len(), 2);
    assert!(world.consent.illegal_transitions().is_empty());
    Ok(())
}

async fn concurrent_enables_share_one_popup() -> Result<()> {
    let (reviewer, mut reviews) = ScriptedReviewer::manual();
    let world = World::new(reviewer);
    let origin = tagged_origin("dapp");
    let first_tab = world.open_tab(&origin).await?;
    let first = first_tab.cardano().await?;
    let second_tab = world.open_tab(&origin).await?;
    let second = second_tab.cardano().await?;

    let first_enable = tokio::spawn(async move { first.enable(EnableOptions::default()).await });
    let review = reviews.next().await?;
    let second_enable = tokio::spawn(async move { second.enable(EnableOptions::default()).await });

    // The second request joins the open popup instead of opening its own.
    assert!(reviews.none_within(Duration::from_millis(100)).await);
    assert_eq!(world.windows.open_count(), 1);
    match &review.view {
        View::Connect(view) => assert_eq!(view.origin, origin),
        View::Signing(_) => panic!("expected a connect popup"),
    }
    review.answer(approve());

    let _ = first_enable.await??;
    let _ = second_enable.await??;
    assert_eq!(world.windows.opened().len(), 1);
    Ok(())
}

async fn identification_is_disclosed_when_requested() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(approve()));
    let origin = tagged_origin("dapp");
    let tab = world.open_tab(&origin).await?;

    let plain = tab.cardano().await?.enable(EnableOptions::default()).await?;
    assert!(plain.experimental().auth().is_none());

    let other = tagged_origin("dapp");
    let tab = world.open_tab(&other).await?;
    let api = tab
        .cardano()
        .await?
        .enable(EnableOptions {
            request_identification: true,
            ..Default::default()
        })
        .await?;
    let auth = api.experimental().auth().expect("identification was requested");
    assert_eq!(auth.wallet_id(), WALLET_ID);
    assert_eq!(auth.wallet_pubkey(), format!("pubkey-{WALLET_ID}"));

    let signature = auth.sign_hex_payload("cafe").await?;
    assert_eq!(signature, json!(format!("{WALLET_ID}:cafe")));
    Ok(())
}

async fn revoke_disconnects_every_tab() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(approve()));
    let origin = tagged_origin("dapp");
    let first = world.open_tab(&origin).await?;
    let second = world.open_tab(&origin).await?;
    let bystander = world.open_tab(&tagged_origin("other")).await?;

    let fired = Arc::new(AtomicUsize::new(0));
    let mut apis = Vec::new();
    for tab in [&first, &second] {
        let api = tab.cardano().await?.enable(EnableOptions::default()).await?;
        let counter = fired.clone();
        api.experimental()
            .on_disconnect(move || {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        apis.push(api);
    }
    let unrelated = bystander
        .cardano()
        .await?
        .enable(EnableOptions::default())
        .await?;

    assert!(world.broker.revoke(&origin, Protocol::Cardano).await?);

    eventually("every tab to see the disconnect", || async {
        fired.load(Ordering::SeqCst) == 2
    })
    .await?;
    for api in &apis {
        assert!(api.is_disconnected().await);
        let error = api.get_network_id().await.unwrap_err();
        assert!(error.is_api(ApiErrorCode::Refused));
    }
    assert!(!unrelated.is_disconnected().await);
    assert!(!first.cardano().await?.is_enabled().await?);

    // Revoking twice changes nothing.
    assert!(!world.broker.revoke(&origin, Protocol::Cardano).await?);
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert!(world.consent.illegal_transitions().is_empty());
    Ok(())
}

async fn wallet_switch_disconnects_its_origins() -> Result<()> {
    let world = World::new(ScriptedReviewer::always(approve()));
    let origins = [tagged_origin("dapp"), tagged_origin("dapp")];
    let mut apis = Vec::new();
    let mut tabs = Vec::new();
    for origin in &origins {
        let tab = world.open_tab(origin).await?;
        apis.push(tab.cardano().await?.enable(EnableOptions::default()).await?);
        tabs.push(tab);
    }

    assert_eq!(world.broker.disconnect_wallet(&WALLET_ID.into()).await?, 2);

    for api in &apis {
        eventually("the page to be disconnected", || api.is_disconnected()).await?;
        let error = api.get_balance(None).await.unwrap_err();
        assert!(error.is_api(ApiErrorCode::AccountChange));
    }
    for origin in &origins {
        assert_eq!(
            world.consent.state(origin, Protocol::Cardano).await?,
            ConnectionState::Disconnected
        );
    }
    Ok(())
}
