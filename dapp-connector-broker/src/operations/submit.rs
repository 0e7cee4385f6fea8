use async_trait::async_trait;
use dapp_connector::{types::signing::SigningKind, ConnectorError};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    broker::{Context, Operation},
    BrokerError,
};

/// `submitTx`. Asks the user first unless the broker is configured not to.
#[derive(Debug)]
pub(crate) struct Submit;

#[async_trait]
impl Operation for Submit {
    #[instrument(skip_all, err(Debug))]
    async fn operation(self, context: &Context) -> Result<Value, BrokerError> {
        let tx = context.param(0).clone();
        if tx.is_null() {
            return Err(ConnectorError::InvalidParameter("tx is required".into()).into());
        }

        if context.config().confirm_submit {
            let _ = context.approve(SigningKind::Submit, tx.clone()).await?;
        } else {
            debug!("Submitting without confirmation.");
        }

        context
            .signer()
            .submit(&context.scope(), &tx)
            .await
            .map_err(BrokerError::Api)
    }
}
