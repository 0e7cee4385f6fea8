use async_trait::async_trait;
use dapp_connector::{
    types::capability::{CardanoFunction as C, Function},
    ConnectorError,
};
use serde_json::Value;
use tracing::instrument;

use crate::{
    broker::{Context, Operation},
    operations::required_string,
    BrokerError,
};

/// `experimental.auth()` calls. Only available to origins that were granted
/// identification when they connected.
#[derive(Debug)]
pub(crate) struct Auth {
    pub function: Function,
}

#[async_trait]
impl Operation for Auth {
    #[instrument(skip_all, err(Debug))]
    async fn operation(self, context: &Context) -> Result<Value, BrokerError> {
        if context.auth.is_none() {
            return Err(BrokerError::IdentificationNotGranted);
        }
        let scope = context.scope();
        let payload = required_string(context.param(0), "payload")?;

        let result = match self.function {
            Function::Cardano(C::AuthSignHexPayload) => {
                context.signer().sign_auth_payload(&scope, &payload).await
            }
            Function::Cardano(C::AuthCheckHexPayload) => {
                let signature = required_string(context.param(1), "signature")?;
                context
                    .signer()
                    .check_auth_payload(&scope, &payload, &signature)
                    .await
            }
            other => {
                return Err(ConnectorError::UnknownFunction {
                    protocol: other.protocol(),
                    function: other.name().to_string(),
                }
                .into())
            }
        };
        result.map_err(BrokerError::Api)
    }
}
