//! Per-realm table of in-flight calls.

use dapp_connector::types::{
    error_codes::ErrorObject,
    protocol::Protocol,
    rpc::{RpcResponse, Uid},
};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::debug;

pub type CallResult = Result<Value, ErrorObject>;

#[derive(Debug)]
struct PendingCall {
    protocol: Protocol,
    sender: oneshot::Sender<CallResult>,
}

/// Calls waiting for a response, keyed by uid. Uids are handed out in
/// increasing order and never reused while the table lives, so a response can
/// only ever reach the call it was meant for.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    next_uid: u64,
    pending: HashMap<Uid, PendingCall>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next uid and a receiver for its result.
    pub fn register(&mut self, protocol: Protocol) -> (Uid, oneshot::Receiver<CallResult>) {
        let uid = Uid(self.next_uid);
        self.next_uid += 1;

        let (sender, receiver) = oneshot::channel();
        let _ = self.pending.insert(uid, PendingCall { protocol, sender });
        (uid, receiver)
    }

    /// Deliver `response` to its caller. Returns `false` if no call with that
    /// uid is outstanding, in which case the response is dropped.
    pub fn resolve(&mut self, response: RpcResponse) -> bool {
        match self.pending.remove(&response.uid) {
            Some(call) => {
                if call.sender.send(response.result).is_err() {
                    debug!("Caller for uid {} is gone.", response.uid);
                }
                true
            }
            None => {
                debug!("Dropping response for unknown uid {}.", response.uid);
                false
            }
        }
    }

    /// Forget `uid` without answering it.
    pub fn cancel(&mut self, uid: Uid) {
        let _ = self.pending.remove(&uid);
    }

    /// Fail every outstanding call of `protocol`, or of every protocol if
    /// `None`. Returns how many calls were failed.
    pub fn reject_all(&mut self, protocol: Option<Protocol>, error: &ErrorObject) -> usize {
        let uids: Vec<Uid> = self
            .pending
            .iter()
            .filter(|(_, call)| protocol.map_or(true, |p| p == call.protocol))
            .map(|(uid, _)| *uid)
            .collect();

        for uid in &uids {
            if let Some(call) = self.pending.remove(uid) {
                let _ = call.sender.send(Err(error.clone()));
            }
        }
        uids.len()
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn is_outstanding(&self, uid: Uid) -> bool {
        self.pending.contains_key(&uid)
    }
}
