//! Per-tab signing queue. Each tab has at most one signing window open;
//! later requests from the same tab wait in order behind it.

use dapp_connector::types::{
    ids::{TabId, WindowId},
    message::PopupRoute,
    rpc::Uid,
    signing::{Decision, SigningRequest},
};
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::{
    broker::{Broker, BrokerState},
    BrokerError,
};

pub(crate) struct PendingSigning {
    request: SigningRequest,
    decision: oneshot::Sender<Decision>,
}

#[derive(Default)]
pub(crate) struct TabSigning {
    active: Option<(WindowId, PendingSigning)>,
    queue: VecDeque<PendingSigning>,
}

/// Where a decision landed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// The request on screen in `WindowId`.
    Active(WindowId),
    /// A request that was still queued.
    Queued,
}

/// Reject everything `tab_id` is waiting on. Returns the windows to close.
pub(crate) fn reject_tab(state: &mut BrokerState, tab_id: TabId) -> Vec<WindowId> {
    let tab = match state.signing.remove(&tab_id) {
        Some(tab) => tab,
        None => return Vec::new(),
    };

    let mut windows = Vec::new();
    if let Some((window_id, pending)) = tab.active {
        let _ = state.sign_windows.remove(&window_id);
        let _ = pending.decision.send(Decision::Rejected);
        windows.push(window_id);
    }
    for pending in tab.queue {
        let _ = pending.decision.send(Decision::Rejected);
    }
    windows
}

impl Broker {
    /// Queue `request` behind the tab's other signing requests and wait for
    /// the user's decision.
    #[instrument(skip_all, fields(uid = %request.uid, kind = %request.kind), err(Debug))]
    pub(crate) async fn request_approval(
        &self,
        request: SigningRequest,
    ) -> Result<Decision, BrokerError> {
        let (tab_id, uid) = (request.tab_id, request.uid);
        let (sender, receiver) = oneshot::channel();
        let pending = PendingSigning {
            request,
            decision: sender,
        };

        {
            let mut guard = self.inner.state.lock().await;
            let state = &mut *guard;
            let busy = state
                .signing
                .get(&tab_id)
                .map_or(false, |tab| tab.active.is_some());
            if busy {
                let tab = state.signing.entry(tab_id).or_default();
                tab.queue.push_back(pending);
                info!("Queued behind {} other request(s).", tab.queue.len());
            } else {
                self.activate(state, tab_id, pending).await?;
            }
        }

        let decision = match self.inner.config.decision_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, receiver).await {
                Ok(decision) => decision,
                Err(_) => {
                    warn!("No decision after {:?}.", timeout);
                    if let Some(Resolved::Active(window_id)) =
                        self.decide(tab_id, uid, Decision::Rejected).await
                    {
                        self.close_windows(vec![window_id]).await;
                    }
                    return Ok(Decision::Rejected);
                }
            },
            None => receiver.await,
        };
        decision.map_err(|_| BrokerError::SigningAbandoned)
    }

    /// Open a signing window for `pending`.
    async fn activate(
        &self,
        state: &mut BrokerState,
        tab_id: TabId,
        pending: PendingSigning,
    ) -> Result<(), BrokerError> {
        let window_id = self
            .inner
            .collaborators
            .windows
            .open(PopupRoute::Sign, self.inner.config.confirmation_window)
            .await?;
        debug!("Opened signing window {}.", window_id);
        let _ = state.sign_windows.insert(window_id, tab_id);
        state.signing.entry(tab_id).or_default().active = Some((window_id, pending));
        Ok(())
    }

    /// Show the next queued request of `tab_id`, if its window is free.
    async fn advance(&self, state: &mut BrokerState, tab_id: TabId) {
        loop {
            let tab = match state.signing.get_mut(&tab_id) {
                Some(tab) => tab,
                None => return,
            };
            if tab.active.is_some() {
                return;
            }
            let next = match tab.queue.pop_front() {
                Some(next) => next,
                None => {
                    let _ = state.signing.remove(&tab_id);
                    return;
                }
            };
            // A request that cannot be shown is dropped, which fails its call.
            match self.activate(state, tab_id, next).await {
                Ok(()) => return,
                Err(e) => warn!("Could not open signing window: {:?}", e),
            }
        }
    }

    /// Deliver `decision` for `(tab_id, uid)`. Each request is decided at
    /// most once; repeats and unknown requests return `None`.
    pub(crate) async fn decide(
        &self,
        tab_id: TabId,
        uid: Uid,
        decision: Decision,
    ) -> Option<Resolved> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let tab = state.signing.get(&tab_id)?;
        if matches!(&tab.active, Some((_, pending)) if pending.request.uid == uid) {
            return self
                .resolve_active(state, tab_id, decision)
                .await
                .map(Resolved::Active);
        }

        let tab = state.signing.get_mut(&tab_id)?;
        let position = tab.queue.iter().position(|p| p.request.uid == uid)?;
        let pending = tab.queue.remove(position)?;
        let _ = pending.decision.send(decision);
        Some(Resolved::Queued)
    }

    /// Deliver `decision` sent from the signing window `window_id`. Only the
    /// request that window is showing can be decided from it; anything else
    /// is ignored. Returns whether the decision was applied.
    pub(crate) async fn decide_in_window(
        &self,
        window_id: WindowId,
        tab_id: TabId,
        uid: Uid,
        decision: Decision,
    ) -> bool {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let shown = state.sign_windows.get(&window_id) == Some(&tab_id)
            && matches!(
                state.signing.get(&tab_id).and_then(|tab| tab.active.as_ref()),
                Some((active, pending)) if *active == window_id && pending.request.uid == uid
            );
        if !shown {
            warn!(
                "Ignoring decision for request {} of tab {}, window {} is not showing it.",
                uid, tab_id, window_id
            );
            return false;
        }
        self.resolve_active(state, tab_id, decision).await.is_some()
    }

    /// Decide the request on screen for `tab_id` and show the next one.
    async fn resolve_active(
        &self,
        state: &mut BrokerState,
        tab_id: TabId,
        decision: Decision,
    ) -> Option<WindowId> {
        let (window_id, pending) = state.signing.get_mut(&tab_id)?.active.take()?;
        let _ = state.sign_windows.remove(&window_id);
        info!("Request {} decided: {:?}.", pending.request.uid, decision);
        let _ = pending.decision.send(decision);
        self.advance(state, tab_id).await;
        Some(window_id)
    }

    /// What the signing window `window_id` should show, if anything.
    pub(crate) async fn signing_request(&self, window_id: WindowId) -> Option<SigningRequest> {
        let state = self.inner.state.lock().await;
        let tab_id = state.sign_windows.get(&window_id)?;
        match &state.signing.get(tab_id)?.active {
            Some((active, pending)) if *active == window_id => Some(pending.request.clone()),
            _ => None,
        }
    }

    /// A signing window closed without a decision rejects its request.
    pub(crate) async fn sign_window_removed(&self, window_id: WindowId) {
        let active = {
            let state = self.inner.state.lock().await;
            state.sign_windows.get(&window_id).and_then(|tab_id| {
                let tab = state.signing.get(tab_id)?;
                match &tab.active {
                    Some((active, pending)) if *active == window_id => {
                        Some((*tab_id, pending.request.uid))
                    }
                    _ => None,
                }
            })
        };
        if let Some((tab_id, uid)) = active {
            debug!("Signing window {} closed without a decision.", window_id);
            let _ = self.decide(tab_id, uid, Decision::Rejected).await;
        }
    }
}
