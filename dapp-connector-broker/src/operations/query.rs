use async_trait::async_trait;
use dapp_connector::{
    constants::{CARDANO_ALL_TOKENS, ERGO_DEFAULT_TOKEN},
    types::{
        capability::{CardanoFunction as C, ErgoFunction as E, Function},
        protocol::Protocol,
    },
    ConnectorError,
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    broker::{Context, Operation},
    operations::{optional_string, paginate},
    AddressKind, BrokerError, UtxoQuery,
};

/// Read-only calls answered from the wallet store.
#[derive(Debug)]
pub(crate) struct Query {
    pub function: Function,
}

#[async_trait]
impl Operation for Query {
    #[instrument(skip_all, err(Debug))]
    async fn operation(self, context: &Context) -> Result<Value, BrokerError> {
        let scope = context.scope();
        let wallet = context.wallet();

        let value = match self.function {
            Function::Cardano(C::GetNetworkId) => wallet.network_id(&scope).await?,
            Function::Cardano(C::GetBalance) | Function::Ergo(E::GetBalance) => {
                let default = match scope.protocol {
                    Protocol::Cardano => CARDANO_ALL_TOKENS,
                    Protocol::Ergo => ERGO_DEFAULT_TOKEN,
                };
                let token_id = optional_string(context.param(0), "token_id")?
                    .unwrap_or_else(|| default.to_string());
                wallet.balance(&scope, &token_id).await?
            }
            Function::Cardano(C::GetUsedAddresses) | Function::Ergo(E::GetUsedAddresses) => {
                let addresses = wallet.addresses(&scope, AddressKind::Used).await?;
                paginate(addresses, context.param(0))?
            }
            Function::Cardano(C::GetUnusedAddresses) | Function::Ergo(E::GetUnusedAddresses) => {
                Value::Array(wallet.addresses(&scope, AddressKind::Unused).await?)
            }
            Function::Cardano(C::GetRewardAddresses) => {
                Value::Array(wallet.addresses(&scope, AddressKind::Reward).await?)
            }
            Function::Cardano(C::GetChangeAddress) | Function::Ergo(E::GetChangeAddress) => wallet
                .addresses(&scope, AddressKind::Change)
                .await?
                .into_iter()
                .next()
                .unwrap_or(Value::Null),
            Function::Cardano(C::GetUtxos) => {
                let query = UtxoQuery {
                    amount: optional_string(context.param(0), "amount")?,
                    token_id: None,
                };
                utxos(context, &query, context.param(1)).await?
            }
            Function::Ergo(E::GetUtxos) => {
                let query = UtxoQuery {
                    amount: optional_string(context.param(0), "amount")?,
                    token_id: optional_string(context.param(1), "token_id")?,
                };
                utxos(context, &query, context.param(2)).await?
            }
            Function::Cardano(C::GetCollateral) => {
                let required = optional_string(context.param(0), "amount")?;
                wallet.collateral(&scope, required.as_deref()).await?
            }
            Function::Cardano(C::Cip95GetPubDrepKey) => wallet.drep_key(&scope).await?,
            Function::Cardano(C::Cip95GetRegisteredPubStakeKeys) => {
                Value::Array(wallet.stake_keys(&scope, true).await?)
            }
            Function::Cardano(C::Cip95GetUnregisteredPubStakeKeys) => {
                Value::Array(wallet.stake_keys(&scope, false).await?)
            }
            Function::Cardano(C::ListNfts) => wallet.nfts(&scope).await?,
            other => {
                return Err(ConnectorError::UnknownFunction {
                    protocol: other.protocol(),
                    function: other.name().to_string(),
                }
                .into())
            }
        };
        debug!("Query answered.");
        Ok(value)
    }
}

/// `null` when the wallet cannot cover the amount.
async fn utxos(
    context: &Context,
    query: &UtxoQuery,
    paginate_param: &Value,
) -> Result<Value, BrokerError> {
    match context.wallet().utxos(&context.scope(), query).await? {
        Some(utxos) => paginate(utxos, paginate_param),
        None => Ok(Value::Null),
    }
}
