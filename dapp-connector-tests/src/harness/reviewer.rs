//! Stand-ins for the person clicking popup buttons.

use async_trait::async_trait;
use dapp_connector_popup::{Choice, Reviewer, View};
use std::{collections::VecDeque, sync::Mutex, time::Duration};
use tokio::sync::{mpsc, oneshot};

use crate::{
    error::{ConnectorTestError, Result},
    harness::WALLET_ID,
    utils::{lock, EVENTUALLY_TIMEOUT},
};

/// Approve with the test wallet.
pub fn approve() -> Choice {
    Choice::Approve {
        wallet_id: Some(WALLET_ID.into()),
    }
}

enum Script {
    Queue {
        choices: Mutex<VecDeque<Choice>>,
        fallback: Choice,
    },
    Manual(mpsc::UnboundedSender<PendingReview>),
}

pub struct ScriptedReviewer {
    script: Script,
}

impl ScriptedReviewer {
    /// Make the same choice in every popup.
    pub fn always(choice: Choice) -> Self {
        Self::sequence(Vec::new(), choice)
    }

    /// Make `choices` in order, then `fallback` forever.
    pub fn sequence(choices: Vec<Choice>, fallback: Choice) -> Self {
        Self {
            script: Script::Queue {
                choices: Mutex::new(choices.into()),
                fallback,
            },
        }
    }

    /// Hand every popup to the test, which answers through the receiver.
    pub fn manual() -> (Self, Reviews) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                script: Script::Manual(sender),
            },
            Reviews { receiver },
        )
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn review(&self, view: &View) -> Choice {
        match &self.script {
            Script::Queue { choices, fallback } => {
                let next = lock(choices).pop_front();
                next.unwrap_or_else(|| fallback.clone())
            }
            Script::Manual(sender) => {
                let (answer, choice) = oneshot::channel();
                let review = PendingReview {
                    view: view.clone(),
                    answer,
                };
                if sender.send(review).is_err() {
                    return Choice::Dismiss;
                }
                // A test that walks away from a review leaves the popup
                // unanswered, as a user who closes it would.
                choice.await.unwrap_or(Choice::Dismiss)
            }
        }
    }
}

/// A popup waiting for the test to decide.
#[derive(Debug)]
pub struct PendingReview {
    pub view: View,
    answer: oneshot::Sender<Choice>,
}

impl PendingReview {
    pub fn answer(self, choice: Choice) {
        // The popup may have been closed underneath us.
        let _ = self.answer.send(choice);
    }
}

/// Popups handed over by a manual [`ScriptedReviewer`].
pub struct Reviews {
    receiver: mpsc::UnboundedReceiver<PendingReview>,
}

impl Reviews {
    pub async fn next(&mut self) -> Result<PendingReview> {
        tokio::time::timeout(EVENTUALLY_TIMEOUT, self.receiver.recv())
            .await
            .ok()
            .flatten()
            .ok_or(ConnectorTestError::Timeout("a popup to review"))
    }

    /// `true` if no popup shows up within `wait`.
    pub async fn none_within(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.receiver.recv())
            .await
            .is_err()
    }
}
