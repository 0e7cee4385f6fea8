use async_trait::async_trait;
use dapp_connector::types::{connection::ConnectionRecord, protocol::Protocol};
use dapp_connector_broker::{ConsentStore, ConsentStoreError};
use std::{collections::HashMap, path::PathBuf};
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::{Config, JsonStoreError};

type Records = HashMap<(String, Protocol), ConnectionRecord>;

/// Consent records persisted as a JSON array.
///
/// The file is read once when the store is opened. Each save writes the whole
/// set to a sibling temporary file and renames it over the original, so a
/// crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonConsentStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonConsentStore {
    #[instrument(skip_all, err(Debug))]
    pub async fn open(config: Config) -> Result<Self, JsonStoreError> {
        let records = match tokio::fs::read(&config.path).await {
            Ok(bytes) => {
                let list: Vec<ConnectionRecord> = serde_json::from_slice(&bytes)?;
                list.into_iter()
                    .map(|record| ((record.origin.clone(), record.protocol), record))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(e) => return Err(e.into()),
        };
        info!("Loaded {} consent record(s).", records.len());

        Ok(Self {
            path: config.path,
            records: Mutex::new(records),
        })
    }

    async fn write(&self, records: &Records) -> Result<(), JsonStoreError> {
        let mut list: Vec<&ConnectionRecord> = records.values().collect();
        list.sort_by(|a, b| (&a.origin, a.protocol).cmp(&(&b.origin, b.protocol)));
        let contents = serde_json::to_vec_pretty(&list)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConsentStore for JsonConsentStore {
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
        if let Err(e) = self.write(&records).await {
            // Keep memory and disk in agreement.
            match previous {
                Some(previous) => {
                    let _ = records.insert((record.origin.clone(), record.protocol), previous);
                }
                None => {
                    let _ = records.remove(&(record.origin.clone(), record.protocol));
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ConnectionRecord>, ConsentStoreError> {
        let records = self.records.lock().await;
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapp_connector::types::connection::{ConnectionEvent, ConnectionState};
    use uuid::Uuid;

    type Result<T> = std::result::Result<T, ConsentStoreError>;

    const ORIGIN: &str = "https://dapp.example";

    fn temp_config() -> Config {
        Config {
            path: std::env::temp_dir().join(format!("consent-{}.json", Uuid::new_v4())),
        }
    }

    #[tokio::test]
    async fn missing_file_opens_empty() -> Result<()> {
        let store = JsonConsentStore::open(temp_config()).await?;
        assert!(store.list_records().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn records_survive_reopening() -> Result<()> {
        let config = temp_config();
        let store = JsonConsentStore::open(config.clone()).await?;

        let mut record = ConnectionRecord::new(ORIGIN, Protocol::Cardano);
        let _ = record.apply(ConnectionEvent::Requested).unwrap();
        let _ = record
            .apply(ConnectionEvent::Approved {
                wallet_id: "wallet-1".into(),
                auth: None,
            })
            .unwrap();
        store.save_record(&record).await?;
        drop(store);

        let reopened = JsonConsentStore::open(config.clone()).await?;
        let found = reopened
            .find_record(ORIGIN, Protocol::Cardano)
            .await?
            .unwrap();
        assert_eq!(found.state, ConnectionState::Connected);
        assert_eq!(found.wallet_id, record.wallet_id);

        let _ = std::fs::remove_file(&config.path);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let config = temp_config();
        std::fs::write(&config.path, b"not json").unwrap();

        let result = JsonConsentStore::open(config.clone()).await;
        assert!(matches!(result, Err(JsonStoreError::Serialization(_))));

        let _ = std::fs::remove_file(&config.path);
    }
}
