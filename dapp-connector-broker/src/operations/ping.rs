use async_trait::async_trait;
use serde_json::Value;

use crate::{
    broker::{Context, Operation},
    BrokerError,
};

/// Liveness check from a connected page.
#[derive(Debug)]
pub(crate) struct Ping;

#[async_trait]
impl Operation for Ping {
    async fn operation(self, _context: &Context) -> Result<Value, BrokerError> {
        Ok(Value::Bool(true))
    }
}
