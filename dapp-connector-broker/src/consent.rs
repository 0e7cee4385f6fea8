use async_trait::async_trait;
use dapp_connector::types::{connection::ConnectionRecord, protocol::Protocol};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsentStoreError {
    #[error("An error occurred within the consent store. See store logs.")]
    Internal(String),
    #[error("Consent store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Consent store contents are malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Persisted consent, one [`ConnectionRecord`] per `(origin, protocol)`.
///
/// Only the broker writes to the store. A record saved in the `Connected`
/// state is a standing grant: later connect requests from that origin are
/// answered without asking the user.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Get the record for `origin` and `protocol`, if one was ever saved.
    async fn find_record(
        &self,
        origin: &str,
        protocol: Protocol,
    ) -> Result<Option<ConnectionRecord>, ConsentStoreError>;

    /// Store `record`, replacing any previous record for the same pair.
    async fn save_record(&self, record: &ConnectionRecord) -> Result<(), ConsentStoreError>;

    /// Every stored record, in no particular order.
    async fn list_records(&self) -> Result<Vec<ConnectionRecord>, ConsentStoreError>;
}
