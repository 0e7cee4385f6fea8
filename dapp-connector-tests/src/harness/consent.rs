//! A consent store that remembers every state change it was asked to save.

use async_trait::async_trait;
use dapp_connector::types::{
    connection::{ConnectionRecord, ConnectionState},
    protocol::Protocol,
};
use dapp_connector_broker::{ConsentStore, ConsentStoreError};
use std::sync::{Arc, Mutex};

use crate::utils::lock;

/// One saved record, as a move between states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub origin: String,
    pub protocol: Protocol,
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl Transition {
    /// Whether the move follows an edge of the connection state machine.
    pub fn is_legal(&self) -> bool {
        use ConnectionState::*;

        matches!(
            (self.from, self.to),
            (Disconnected, PendingApproval)
                | (PendingApproval, Connected)
                | (PendingApproval, Disconnected)
                | (Connected, Disconnected)
        )
    }
}

pub struct RecordingConsentStore {
    inner: Arc<dyn ConsentStore>,
    transitions: Mutex<Vec<Transition>>,
}

impl RecordingConsentStore {
    pub fn new(inner: Arc<dyn ConsentStore>) -> Self {
        Self {
            inner,
            transitions: Mutex::new(Vec::new()),
        }
    }

    pub fn transitions(&self) -> Vec<Transition> {
        lock(&self.transitions).clone()
    }

    /// Every transition saved so far that the state machine does not allow.
    pub fn illegal_transitions(&self) -> Vec<Transition> {
        self.transitions()
            .into_iter()
            .filter(|t| !t.is_legal())
            .collect()
    }

    /// Current state of `origin`; never saved reads as disconnected.
    pub async fn state(
        &self,
        origin: &str,
        protocol: Protocol,
    ) -> Result<ConnectionState, ConsentStoreError> {
        Ok(self
            .inner
            .find_record(origin, protocol)
            .await?
            .map(|record| record.state)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ConsentStore for RecordingConsentStore {
    async fn find_record(
        &self,
        origin: &str,
        protocol: Protocol,
    ) -> Result<Option<ConnectionRecord>, ConsentStoreError> {
        self.inner.find_record(origin, protocol).await
    }

    async fn save_record(&self, record: &ConnectionRecord) -> Result<(), ConsentStoreError> {
        let from = self.state(&record.origin, record.protocol).await?;
        self.inner.save_record(record).await?;
        lock(&self.transitions).push(Transition {
            origin: record.origin.clone(),
            protocol: record.protocol,
            from,
            to: record.state,
        });
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ConnectionRecord>, ConsentStoreError> {
        self.inner.list_records().await
    }
}
