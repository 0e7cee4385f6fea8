use async_trait::async_trait;
use dapp_connector::types::{connection::ConnectionRecord, protocol::Protocol};
use dapp_connector_broker::{ConsentStore, ConsentStoreError};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Consent records held in memory, keyed by `(origin, protocol)`.
#[derive(Debug, Default)]
pub struct HashmapConsentStore {
    records: Mutex<HashMap<(String, Protocol), ConnectionRecord>>,
}

impl HashmapConsentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentStore for HashmapConsentStore {
    async fn find_record(
        &self,
        origin: &str,
        protocol: Protocol,
    ) -> Result<Option<ConnectionRecord>, ConsentStoreError> {
        let records = self.records.lock().await;
        Ok(records.get(&(origin.to_string(), protocol)).cloned())
    }

    async fn save_record(&self, record: &ConnectionRecord) -> Result<(), ConsentStoreError> {
        let mut records = self.records.lock().await;
        let previous = records.insert((record.origin.clone(), record.protocol), record.clone());
        if let Some(previous) = previous {
            tracing::debug!("{} moved from {} to {}.", record.origin, previous.state, record.state);
        }
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ConnectionRecord>, ConsentStoreError> {
        let records = self.records.lock().await;
        Ok(records.values().cloned().collect())
    }
}
