mod auth;
mod ping;
mod query;
mod sign;
mod submit;

pub(crate) use self::{auth::Auth, ping::Ping, query::Query, sign::Sign, submit::Submit};

use dapp_connector::{types::rpc::Paginate, ConnectorError};
use serde_json::Value;

/// Read an optional string-like parameter. Numbers are accepted and kept as
/// their decimal text, since pages send amounts either way.
fn optional_string(value: &Value, name: &str) -> Result<Option<String>, ConnectorError> {
    match value {
        Value::Null => Ok(None),
        Value::String(value) => Ok(Some(value.clone())),
        Value::Number(value) => Ok(Some(value.to_string())),
        _ => Err(ConnectorError::InvalidParameter(name.to_string())),
    }
}

fn required_string(value: &Value, name: &str) -> Result<String, ConnectorError> {
    optional_string(value, name)?
        .ok_or_else(|| ConnectorError::InvalidParameter(format!("{name} is required")))
}

fn paginate(items: Vec<Value>, param: &Value) -> Result<Value, crate::BrokerError> {
    let items = match Paginate::from_param(param)? {
        Some(paginate) => paginate.apply(items).map_err(crate::BrokerError::Api)?,
        None => items,
    };
    Ok(Value::Array(items))
}
