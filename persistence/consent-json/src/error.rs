use dapp_connector_broker::ConsentStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonStoreError {
    #[error("Consent file I/O error")]
    Io(#[from] std::io::Error),
    #[error("Could not serialize/deserialize consent records")]
    Serialization(#[from] serde_json::Error),
    #[error("Fail to read TOML file contents.")]
    TomlReadFailure(#[from] toml::de::Error),
}

impl From<JsonStoreError> for ConsentStoreError {
    fn from(error: JsonStoreError) -> Self {
        match error {
            JsonStoreError::Io(e) => Self::Io(e),
            JsonStoreError::Serialization(e) => Self::Malformed(e),
            JsonStoreError::TomlReadFailure(_) => Self::Internal(error.to_string()),
        }
    }
}
