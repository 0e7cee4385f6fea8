use async_trait::async_trait;
use dapp_connector::types::{
    ids::{WalletId, WindowId},
    message::{PopupMessage, PopupReply, PopupRoute},
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    view::{render_connect, render_signing},
    PopupError, View,
};

/// `runtime.sendMessage` from the popup to the broker.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn send(&self, message: PopupMessage) -> Result<PopupReply, PopupError>;
}

/// The person looking at the popup.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, view: &View) -> Choice;
}

/// `window.close()` for the popup's own window.
#[async_trait]
pub trait WindowControl: Send + Sync {
    async fn close(&self, window_id: WindowId) -> Result<(), PopupError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// Connect requests need the wallet to connect with. Signing requests
    /// ignore it.
    Approve { wallet_id: Option<WalletId> },
    Reject,
    /// The window was closed without pressing anything.
    Dismiss,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The broker had nothing for this window.
    NothingPending,
    Decided,
    Dismissed,
}

/// One popup lifetime.
pub struct ConfirmationWindow {
    window_id: WindowId,
    route: PopupRoute,
    broker: Arc<dyn BrokerPort>,
    reviewer: Arc<dyn Reviewer>,
    control: Arc<dyn WindowControl>,
}

impl ConfirmationWindow {
    pub fn new(
        window_id: WindowId,
        route: PopupRoute,
        broker: Arc<dyn BrokerPort>,
        reviewer: Arc<dyn Reviewer>,
        control: Arc<dyn WindowControl>,
    ) -> Self {
        Self {
            window_id,
            route,
            broker,
            reviewer,
            control,
        }
    }

    /// Show the pending request, report the user's decision and close. The
    /// window is closed whatever happens.
    #[instrument(skip(self), fields(window_id = %self.window_id, route = %self.route), err(Debug))]
    pub async fn run(self) -> Result<Outcome, PopupError> {
        let outcome = match self.route {
            PopupRoute::Connect => self.review_connect().await,
            PopupRoute::Sign => self.review_signing().await,
        };
        if let Err(e) = &outcome {
            warn!("Closing without a decision: {}", e);
        }
        self.control.close(self.window_id).await?;
        outcome
    }

    async fn review_connect(&self) -> Result<Outcome, PopupError> {
        let prompt = match self
            .broker
            .send(PopupMessage::ConnectRetrieveData {
                window_id: self.window_id,
            })
            .await?
        {
            PopupReply::ConnectData { prompt: Some(prompt) } => prompt,
            PopupReply::ConnectData { prompt: None } => return Ok(Outcome::NothingPending),
            _ => return Err(PopupError::UnexpectedReply("connect_retrieve_data")),
        };

        let view = View::Connect(render_connect(&prompt));
        let (accepted, wallet_id) = match self.reviewer.review(&view).await {
            Choice::Approve {
                wallet_id: Some(wallet_id),
            } => (true, Some(wallet_id)),
            Choice::Approve { wallet_id: None } => return Err(PopupError::NoWalletSelected),
            Choice::Reject => (false, None),
            Choice::Dismiss => return Ok(Outcome::Dismissed),
        };

        info!("Connect {} for {}.", if accepted { "approved" } else { "rejected" }, prompt.origin);
        let _ = self
            .broker
            .send(PopupMessage::ConnectResponse {
                window_id: self.window_id,
                accepted,
                wallet_id,
            })
            .await?;
        Ok(Outcome::Decided)
    }

    async fn review_signing(&self) -> Result<Outcome, PopupError> {
        let request = match self
            .broker
            .send(PopupMessage::TxSignWindowRetrieveData {
                window_id: self.window_id,
            })
            .await?
        {
            PopupReply::SigningData {
                request: Some(request),
            } => request,
            PopupReply::SigningData { request: None } => return Ok(Outcome::NothingPending),
            _ => return Err(PopupError::UnexpectedReply("tx_sign_window_retrieve_data")),
        };

        let view = View::Signing(render_signing(&request)?);
        let (window_id, uid, tab_id) = (self.window_id, request.uid, request.tab_id);
        let decision = match self.reviewer.review(&view).await {
            Choice::Approve { .. } => PopupMessage::SignConfirmed {
                window_id,
                uid,
                tab_id,
            },
            Choice::Reject => PopupMessage::SignRejected {
                window_id,
                uid,
                tab_id,
            },
            Choice::Dismiss => return Ok(Outcome::Dismissed),
        };
        let _ = self.broker.send(decision).await?;
        Ok(Outcome::Decided)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapp_connector::types::{
        ids::TabId,
        message::ConnectPrompt,
        protocol::Protocol,
        rpc::Uid,
        signing::{SigningKind, SigningRequest},
    };
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedBroker {
        pending: PopupReply,
        sent: Mutex<Vec<PopupMessage>>,
    }

    #[async_trait]
    impl BrokerPort for ScriptedBroker {
        async fn send(&self, message: PopupMessage) -> Result<PopupReply, PopupError> {
            let reply = match &message {
                PopupMessage::ConnectRetrieveData { .. }
                | PopupMessage::TxSignWindowRetrieveData { .. } => self.pending.clone(),
                _ => PopupReply::Ack,
            };
            self.sent.lock().unwrap().push(message);
            Ok(reply)
        }
    }

    struct Always(Choice);

    #[async_trait]
    impl Reviewer for Always {
        async fn review(&self, _view: &View) -> Choice {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct Closed(Mutex<Vec<WindowId>>);

    #[async_trait]
    impl WindowControl for Closed {
        async fn close(&self, window_id: WindowId) -> Result<(), PopupError> {
            self.0.lock().unwrap().push(window_id);
            Ok(())
        }
    }

    async fn run(
        route: PopupRoute,
        pending: PopupReply,
        choice: Choice,
    ) -> (Result<Outcome, PopupError>, Vec<PopupMessage>, Vec<WindowId>) {
        let broker = Arc::new(ScriptedBroker {
            pending,
            sent: Mutex::new(Vec::new()),
        });
        let closed = Arc::new(Closed::default());
        let outcome = ConfirmationWindow::new(
            WindowId(5),
            route,
            broker.clone(),
            Arc::new(Always(choice)),
            closed.clone(),
        )
        .run()
        .await;
        let sent = broker.sent.lock().unwrap().clone();
        let closed = closed.0.lock().unwrap().clone();
        (outcome, sent, closed)
    }

    fn signing_data() -> PopupReply {
        PopupReply::SigningData {
            request: Some(SigningRequest {
                uid: Uid(2),
                tab_id: TabId(9),
                origin: "https://dapp.example".to_string(),
                protocol: Protocol::Cardano,
                kind: SigningKind::Tx,
                payload: json!("84a4"),
            }),
        }
    }

    #[tokio::test]
    async fn connect_approval_sends_one_decision_and_closes() {
        let prompt = ConnectPrompt {
            origin: "https://dapp.example".to_string(),
            protocol: Protocol::Cardano,
            favicon: String::new(),
            request_identification: false,
        };
        let (outcome, sent, closed) = run(
            PopupRoute::Connect,
            PopupReply::ConnectData {
                prompt: Some(prompt),
            },
            Choice::Approve {
                wallet_id: Some("wallet-1".into()),
            },
        )
        .await;

        assert_eq!(outcome.unwrap(), Outcome::Decided);
        assert_eq!(
            sent.last().unwrap(),
            &PopupMessage::ConnectResponse {
                window_id: WindowId(5),
                accepted: true,
                wallet_id: Some("wallet-1".into()),
            }
        );
        assert_eq!(closed, vec![WindowId(5)]);
    }

    #[tokio::test]
    async fn signing_rejection_names_the_request() {
        let (outcome, sent, _) = run(PopupRoute::Sign, signing_data(), Choice::Reject).await;
        assert_eq!(outcome.unwrap(), Outcome::Decided);
        assert_eq!(
            sent.last().unwrap(),
            &PopupMessage::SignRejected {
                window_id: WindowId(5),
                uid: Uid(2),
                tab_id: TabId(9)
            }
        );
    }

    #[tokio::test]
    async fn dismissing_sends_nothing() {
        let (outcome, sent, closed) = run(PopupRoute::Sign, signing_data(), Choice::Dismiss).await;
        assert_eq!(outcome.unwrap(), Outcome::Dismissed);
        assert_eq!(sent.len(), 1);
        assert_eq!(closed.len(), 1);
    }

    #[tokio::test]
    async fn stale_window_closes_without_asking() {
        let (outcome, sent, closed) = run(
            PopupRoute::Connect,
            PopupReply::ConnectData { prompt: None },
            Choice::Reject,
        )
        .await;
        assert_eq!(outcome.unwrap(), Outcome::NothingPending);
        assert_eq!(sent.len(), 1);
        assert_eq!(closed.len(), 1);
    }
}
