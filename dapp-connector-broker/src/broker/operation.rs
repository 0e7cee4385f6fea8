use async_trait::async_trait;
use dapp_connector::types::rpc::RpcResponse;
use serde_json::Value;
use tracing::{debug, info};

use crate::{broker::Context, BrokerError};

/// A type implementing [`Operation`] handles one group of page-facing
/// functions once the call has been validated and the origin's grant checked.
#[async_trait]
pub(crate) trait Operation: Sized + Send + 'static {
    /// Core logic for a given operation.
    async fn operation(self, context: &Context) -> Result<Value, BrokerError>;

    /// Runs the operation and turns its outcome into the response for the
    /// page. Errors are logged here and sanitized on conversion.
    async fn handle_request(self, context: Context) -> RpcResponse {
        let uid = context.request.uid;
        match self.operation(&context).await {
            Ok(value) => {
                debug!("Call {} completed.", uid);
                RpcResponse::ok(uid, value)
            }
            Err(e) => {
                info!("Call {} failed: {:?}", uid, e);
                RpcResponse::err(uid, e.into())
            }
        }
    }
}
