//! Matching responses to calls when the relay answers out of order.
//!
//! These tests stand in for the relay themselves, listening on the page's
//! window and answering in whatever order they like.

use colored::Colorize;
use dapp_connector::{
    constants::DEFAULT_WALLET_NAME,
    infrastructure::channel::{WindowBus, WindowListener},
    types::{
        capability::WalletDescriptor,
        injection::{BuildFlavor, StaticDocument},
        message::{ConnectResponse, PageMessage},
        protocol::Protocol,
        rpc::{RpcRequest, RpcResponse},
    },
};
use dapp_connector_page::{CardanoApi, EnableOptions, Realm};
use serde_json::json;
use std::{collections::HashSet, sync::Arc};

use crate::{
    config::Config,
    error::{ConnectorTestError, Result},
    run_parallel,
    utils::{eventually, report_test_results, tagged_origin, TestResult, EVENTUALLY_TIMEOUT},
};

pub async fn run_tests(config: &Config) -> Result<Vec<TestResult>> {
    println!("{}", "Running correlation tests".cyan());

    let results = run_parallel!(
        config.clone(),
        responses_reach_their_callers_in_any_order(),
        concurrent_calls_get_distinct_uids(),
        duplicate_responses_are_ignored(),
        foreign_messages_are_ignored(),
    )?;

    println!("correlation tests: {}", report_test_results(&results));

    Ok(results)
}

/// A page with the wallet installed and connected, and a listener playing
/// the relay.
struct Page {
    realm: Realm,
    bus: WindowBus,
    relay: WindowListener,
    api: CardanoApi,
}

impl Page {
    async fn connected() -> Result<Self> {
        let origin = tagged_origin("dapp");
        let bus = WindowBus::new(origin.clone());
        let realm = Realm::new(bus.clone(), Arc::new(StaticDocument::new(origin, None)));
        let mut relay = bus.subscribe();
        realm
            .install(WalletDescriptor::new(DEFAULT_WALLET_NAME, ""), BuildFlavor::Prod)
            .await?;

        let wallet = realm
            .cardano(DEFAULT_WALLET_NAME)
            .await
            .ok_or(ConnectorTestError::MissingGlobal("cardano"))?;
        let enabling = tokio::spawn(async move { wallet.enable(EnableOptions::default()).await });

        loop {
            if let PageMessage::ConnectRequest { protocol, .. } = next_message(&mut relay).await? {
                bus.post_message(&PageMessage::ConnectResponse {
                    protocol,
                    response: ConnectResponse::accepted(None),
                })?;
                break;
            }
        }
        let api = enabling.await??;

        Ok(Self {
            realm,
            bus,
            relay,
            api,
        })
    }

    /// Collect the next `count` calls the page posts.
    async fn requests(&mut self, count: usize) -> Result<Vec<RpcRequest>> {
        let mut requests = Vec::with_capacity(count);
        while requests.len() < count {
            if let PageMessage::RpcRequest(request) = next_message(&mut self.relay).await? {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    fn respond(&self, response: RpcResponse) -> Result<()> {
        Ok(self.bus.post_message(&PageMessage::RpcResponse(response))?)
    }
}

async fn next_message(listener: &mut WindowListener) -> Result<PageMessage> {
    tokio::time::timeout(EVENTUALLY_TIMEOUT, listener.receive())
        .await
        .map_err(|_| ConnectorTestError::Timeout("a page message"))?
        .map_err(Into::into)
}

async fn responses_reach_their_callers_in_any_order() -> Result<()> {
    let mut page = Page::connected().await?;

    let network = {
        let api = page.api.clone();
        tokio::spawn(async move { api.get_network_id().await })
    };
    let balance = {
        let api = page.api.clone();
        tokio::spawn(async move { api.get_balance(None).await })
    };

    let mut requests = page.requests(2).await?;
    requests.reverse();
    for request in requests {
        page.respond(RpcResponse::ok(request.uid, json!(request.function)))?;
    }

    assert_eq!(network.await??, json!("get_network_id"));
    assert_eq!(balance.await??, json!("get_balance"));
    assert_eq!(page.realm.outstanding_calls().await, 0);
    Ok(())
}

async fn concurrent_calls_get_distinct_uids() -> Result<()> {
    const CALLS: usize = 16;
    let mut page = Page::connected().await?;

    let calls: Vec<_> = (0..CALLS)
        .map(|_| {
            let api = page.api.clone();
            tokio::spawn(async move { api.get_change_address().await })
        })
        .collect();

    let requests = page.requests(CALLS).await?;
    let uids: HashSet<_> = requests.iter().map(|r| r.uid).collect();
    assert_eq!(uids.len(), CALLS);
    assert!(requests.iter().all(|r| r.protocol == Protocol::Cardano));

    for request in requests.iter().rev() {
        page.respond(RpcResponse::ok(request.uid, json!(request.uid.0)))?;
    }
    let mut answered = HashSet::new();
    for call in calls {
        let _ = answered.insert(call.await??.as_u64());
    }
    assert_eq!(answered.len(), CALLS);
    Ok(())
}

async fn duplicate_responses_are_ignored() -> Result<()> {
    let mut page = Page::connected().await?;

    let call = {
        let api = page.api.clone();
        tokio::spawn(async move { api.get_network_id().await })
    };
    let request = page.requests(1).await?.remove(0);

    page.respond(RpcResponse::ok(request.uid, json!("first")))?;
    page.respond(RpcResponse::ok(request.uid, json!("second")))?;

    assert_eq!(call.await??, json!("first"));
    eventually("the table to drain", || async {
        page.realm.outstanding_calls().await == 0
    })
    .await?;
    Ok(())
}

async fn foreign_messages_are_ignored() -> Result<()> {
    let mut page = Page::connected().await?;

    let call = {
        let api = page.api.clone();
        tokio::spawn(async move { api.get_network_id().await })
    };
    let request = page.requests(1).await?.remove(0);

    // Another frame answering for us, and a script speaking its own protocol.
    page.bus.post_raw(
        "https://evil.example".to_string(),
        json!({ "type": "connector_rpc_response", "uid": request.uid.0, "ok": "evil" }),
    );
    page.bus.post_raw(
        page.bus.origin().to_string(),
        json!({ "type": "wallet_ad", "uid": request.uid.0 }),
    );
    page.respond(RpcResponse::ok(request.uid, json!(1)))?;

    assert_eq!(call.await??, json!(1));
    Ok(())
}
