use async_trait::async_trait;
use dapp_connector::{
    types::{
        capability::{CardanoFunction as C, ErgoFunction as E, Function},
        signing::SigningKind,
    },
    ConnectorError,
};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::{
    broker::{Context, Operation},
    operations::required_string,
    BrokerError,
};

/// Calls that need the user's approval before the signer runs.
#[derive(Debug)]
pub(crate) struct Sign {
    pub function: Function,
    pub kind: SigningKind,
}

impl Sign {
    /// What the confirmation window shows for this call.
    async fn payload(&self, context: &Context) -> Result<Value, BrokerError> {
        let payload = match self.function {
            Function::Cardano(C::CreateTx) => {
                context
                    .wallet()
                    .create_tx(&context.scope(), context.param(0))
                    .await?
            }
            Function::Cardano(C::SignTx) | Function::Ergo(E::SignTx) => {
                let tx = context.param(0);
                if tx.is_null() {
                    return Err(ConnectorError::InvalidParameter("tx is required".into()).into());
                }
                tx.clone()
            }
            Function::Cardano(C::SignData | C::Cip95SignData) => json!({
                "address": required_string(context.param(0), "address")?,
                "payload": required_string(context.param(1), "payload")?,
            }),
            Function::Ergo(E::SignTxInput) => {
                let index = context.param(1).as_u64().ok_or_else(|| {
                    ConnectorError::InvalidParameter("index must be a non-negative integer".into())
                })?;
                json!({ "tx": context.param(0), "index": index })
            }
            other => {
                return Err(ConnectorError::UnknownFunction {
                    protocol: other.protocol(),
                    function: other.name().to_string(),
                }
                .into())
            }
        };
        Ok(payload)
    }
}

#[async_trait]
impl Operation for Sign {
    #[instrument(skip_all, err(Debug))]
    async fn operation(self, context: &Context) -> Result<Value, BrokerError> {
        let payload = self.payload(context).await?;
        let request = context.approve(self.kind, payload).await?;
        info!("User approved signing.");
        context
            .signer()
            .sign(&context.scope(), &request)
            .await
            .map_err(BrokerError::Api)
    }
}
