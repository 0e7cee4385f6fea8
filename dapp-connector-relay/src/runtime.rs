use async_trait::async_trait;
use dapp_connector::types::message::{RuntimeReply, RuntimeRequest};

use crate::RelayError;

/// `runtime.sendMessage` towards the background broker. The sending tab is
/// implied by the channel, as it is for the browser runtime.
///
/// Implementations return [`RelayError::RuntimeUnavailable`] when the
/// background context is gone.
#[async_trait]
pub trait RuntimeChannel: Send + Sync {
    async fn send_message(&self, request: RuntimeRequest) -> Result<RuntimeReply, RelayError>;
}
