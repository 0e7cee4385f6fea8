//! Connect requests and the popup that answers them.

use dapp_connector::types::{
    connection::{ConnectionEvent, ConnectionState, WalletAuth},
    ids::{TabId, WalletId, WindowId},
    message::{ConnectPrompt, ConnectResponse, PopupRoute},
    protocol::Protocol,
};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::{broker::Broker, BrokerError};

/// An open connect window and the tabs waiting on its answer.
pub(crate) struct ConnectPromptState {
    prompt: ConnectPrompt,
    waiters: Vec<(TabId, oneshot::Sender<ConnectResponse>)>,
}

impl ConnectPromptState {
    pub(super) fn remove_tab(&mut self, tab_id: TabId) {
        self.waiters.retain(|(waiting, _)| *waiting != tab_id);
    }
}

impl Broker {
    /// Answer a connect request. A standing grant answers immediately.
    /// Otherwise a connect window is opened, or joined if one is already open
    /// for the same origin, and the response waits for the user.
    #[instrument(skip(self, favicon), err(Debug))]
    pub(crate) async fn connect(
        &self,
        tab_id: TabId,
        protocol: Protocol,
        origin: String,
        request_identification: bool,
        only_silent: bool,
        favicon: String,
    ) -> Result<ConnectResponse, BrokerError> {
        let receiver = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            let mut record = self.load_record(&origin, protocol).await?;

            if record.is_connected() {
                state.subscribe(&origin, protocol, tab_id);
                debug!("Standing grant found.");
                return Ok(ConnectResponse::accepted(record.auth));
            }
            if only_silent {
                return Err(BrokerError::NoStandingGrant);
            }

            let (sender, receiver) = oneshot::channel();
            let key = (origin.clone(), protocol);
            let open_prompt = state
                .pending_connects
                .get(&key)
                .and_then(|window_id| state.prompts.get_mut(window_id));

            match open_prompt {
                Some(prompt) => {
                    debug!("Joining the connect window already open for this origin.");
                    prompt.waiters.push((tab_id, sender));
                }
                None => {
                    if record.state == ConnectionState::PendingApproval {
                        // Left behind by a window that no longer exists.
                        let _ = record.apply(ConnectionEvent::Rejected)?;
                        self.consent().save_record(&record).await?;
                    }
                    let _ = record.apply(ConnectionEvent::Requested)?;
                    self.consent().save_record(&record).await?;

                    let opened = self
                        .inner
                        .collaborators
                        .windows
                        .open(PopupRoute::Connect, self.inner.config.confirmation_window)
                        .await;
                    let window_id = match opened {
                        Ok(window_id) => window_id,
                        Err(e) => {
                            let _ = record.apply(ConnectionEvent::Rejected)?;
                            self.consent().save_record(&record).await?;
                            return Err(e.into());
                        }
                    };
                    info!("Opened connect window {}.", window_id);

                    let _ = state.prompts.insert(
                        window_id,
                        ConnectPromptState {
                            prompt: ConnectPrompt {
                                origin,
                                protocol,
                                favicon,
                                request_identification,
                            },
                            waiters: vec![(tab_id, sender)],
                        },
                    );
                    let _ = state.pending_connects.insert(key, window_id);
                }
            }
            receiver
        };

        // The sender only goes away if the tab was closed while waiting.
        receiver.await.map_err(|_| BrokerError::AccessDeclined)
    }

    /// What the connect window `window_id` should show, if it is still open.
    pub(crate) async fn connect_prompt(&self, window_id: WindowId) -> Option<ConnectPrompt> {
        let state = self.inner.state.lock().await;
        state
            .prompts
            .get(&window_id)
            .map(|prompt| prompt.prompt.clone())
    }

    /// Settle the connect window `window_id`. `Some(wallet)` approves with
    /// that wallet; `None` rejects. Unknown windows are ignored. Every tab
    /// waiting on the window gets an answer, even if settling fails.
    #[instrument(skip(self))]
    pub(crate) async fn resolve_connect(&self, window_id: WindowId, wallet_id: Option<WalletId>) {
        let (waiters, response) = {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            let ConnectPromptState { prompt, waiters } = match state.prompts.remove(&window_id) {
                Some(prompt) => prompt,
                None => return,
            };
            let _ = state
                .pending_connects
                .remove(&(prompt.origin.clone(), prompt.protocol));

            let response = match self.settle_connect(&prompt, wallet_id).await {
                Ok(response) => {
                    if response.success {
                        for (tab_id, _) in &waiters {
                            state.subscribe(&prompt.origin, prompt.protocol, *tab_id);
                        }
                    }
                    response
                }
                Err(e) => {
                    warn!("Settling connect for {} failed: {:?}", prompt.origin, e);
                    self.abandon_connect(&prompt).await;
                    ConnectResponse::refused(e.into())
                }
            };
            (waiters, response)
        };

        for (tab_id, waiter) in waiters {
            if waiter.send(response.clone()).is_err() {
                warn!("Tab {} stopped waiting for its connect response.", tab_id);
            }
        }
    }

    async fn settle_connect(
        &self,
        prompt: &ConnectPrompt,
        wallet_id: Option<WalletId>,
    ) -> Result<ConnectResponse, BrokerError> {
        let mut record = self.load_record(&prompt.origin, prompt.protocol).await?;
        let response = match wallet_id {
            Some(wallet_id) => {
                let auth = if prompt.request_identification {
                    let pubkey = self
                        .inner
                        .collaborators
                        .wallet
                        .auth_pubkey(&wallet_id)
                        .await?;
                    Some(WalletAuth {
                        wallet_id: wallet_id.clone(),
                        pubkey,
                    })
                } else {
                    None
                };
                let _ = record.apply(ConnectionEvent::Approved {
                    wallet_id,
                    auth: auth.clone(),
                })?;
                info!("{} connected.", prompt.origin);
                ConnectResponse::accepted(auth)
            }
            None => {
                let _ = record.apply(ConnectionEvent::Rejected)?;
                info!("{} was refused.", prompt.origin);
                ConnectResponse::refused(BrokerError::AccessDeclined.into())
            }
        };
        self.consent().save_record(&record).await?;
        Ok(response)
    }

    /// Put a record whose window failed back to `Disconnected`.
    async fn abandon_connect(&self, prompt: &ConnectPrompt) {
        let reset = async {
            let mut record = self.load_record(&prompt.origin, prompt.protocol).await?;
            if record.state == ConnectionState::PendingApproval {
                let _ = record.apply(ConnectionEvent::Rejected)?;
                self.consent().save_record(&record).await?;
            }
            Ok::<_, BrokerError>(())
        };
        if let Err(e) = reset.await {
            warn!("Could not reset {} after a failed connect: {:?}", prompt.origin, e);
        }
    }
}
