//! Request/response correlation types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

use crate::{
    types::{
        error_codes::{ApiErrorCode, ErrorObject},
        protocol::{Protocol, ReturnType},
    },
    ConnectorError,
};

/// Correlation id for one RPC round-trip. Monotonic within one page realm and
/// reset when the page reloads.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub u64);

impl Display for Uid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub uid: Uid,
    pub protocol: Protocol,
    pub function: String,
    #[serde(default)]
    pub params: Vec<Value>,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<ReturnType>,
}

impl RpcRequest {
    /// Parameter at `index`, treating a missing trailing parameter like an
    /// explicit `null`.
    pub fn param(&self, index: usize) -> &Value {
        self.params.get(index).unwrap_or(&Value::Null)
    }
}

/// Exactly one of these must eventually exist per live request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRpcResponse", into = "RawRpcResponse")]
pub struct RpcResponse {
    pub uid: Uid,
    pub result: Result<Value, ErrorObject>,
}

impl RpcResponse {
    pub fn ok(uid: Uid, value: Value) -> Self {
        Self {
            uid,
            result: Ok(value),
        }
    }

    pub fn err(uid: Uid, error: ErrorObject) -> Self {
        Self {
            uid,
            result: Err(error),
        }
    }

    /// Synthesized when the transport to the broker fails, so the page never
    /// waits forever.
    pub fn internal_error(uid: Uid, info: impl Into<String>) -> Self {
        Self::err(uid, ErrorObject::api(ApiErrorCode::InternalError, info))
    }
}

/// Wire form: `{uid, ok}` or `{uid, err}`.
#[derive(Serialize, Deserialize)]
struct RawRpcResponse {
    uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ok: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    err: Option<ErrorObject>,
}

impl TryFrom<RawRpcResponse> for RpcResponse {
    type Error = ConnectorError;

    fn try_from(raw: RawRpcResponse) -> Result<Self, Self::Error> {
        let result = match (raw.ok, raw.err) {
            (Some(_), Some(_)) => return Err(ConnectorError::InvalidMessage),
            (_, Some(err)) => Err(err),
            (ok, None) => Ok(ok.unwrap_or(Value::Null)),
        };
        Ok(Self {
            uid: raw.uid,
            result,
        })
    }
}

impl From<RpcResponse> for RawRpcResponse {
    fn from(response: RpcResponse) -> Self {
        let (ok, err) = match response.result {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            uid: response.uid,
            ok,
            err,
        }
    }
}

/// CIP-30 `paginate` argument.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginate {
    pub page: u64,
    pub limit: u64,
}

impl Paginate {
    /// Read an optional paginate parameter. `null` means "everything".
    pub fn from_param(value: &Value) -> Result<Option<Self>, ConnectorError> {
        if value.is_null() {
            return Ok(None);
        }
        let paginate: Self = serde_json::from_value(value.clone())
            .map_err(|_| ConnectorError::InvalidParameter("paginate".to_string()))?;
        if paginate.limit == 0 {
            return Err(ConnectorError::InvalidParameter(
                "paginate.limit must be positive".to_string(),
            ));
        }
        Ok(Some(paginate))
    }

    /// Cut one page out of `items`. A page past the end fails with the number
    /// of pages that do exist. An empty list always has an empty first page.
    pub fn apply<T>(&self, items: Vec<T>) -> Result<Vec<T>, ErrorObject> {
        let total = items.len() as u64;
        let pages = (total + self.limit - 1) / self.limit;
        if self.page >= pages {
            if total == 0 && self.page == 0 {
                return Ok(items);
            }
            return Err(ErrorObject::paginate(pages));
        }

        let start = (self.page * self.limit) as usize;
        Ok(items
            .into_iter()
            .skip(start)
            .take(self.limit as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_wire_format() {
        let ok = RpcResponse::ok(Uid(3), json!(["addr1"]));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "uid": 3, "ok": ["addr1"] })
        );

        let err: RpcResponse =
            serde_json::from_value(json!({ "uid": 4, "err": { "code": -3, "info": "no" } }))
                .unwrap();
        assert_eq!(err.uid, Uid(4));
        assert!(err.result.unwrap_err().is_api(ApiErrorCode::Refused));
    }

    #[test]
    fn response_with_both_fields_is_rejected() {
        let both = json!({ "uid": 1, "ok": 1, "err": { "code": -2, "info": "x" } });
        assert!(serde_json::from_value::<RpcResponse>(both).is_err());
    }

    #[test]
    fn request_uses_camel_case() {
        let request = RpcRequest {
            uid: Uid(1),
            protocol: Protocol::Cardano,
            function: "get_utxos".to_string(),
            params: vec![Value::Null],
            origin: "https://dapp.example".to_string(),
            return_type: Some(ReturnType::Json),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["returnType"], json!("json"));
        assert_eq!(request.param(5), &Value::Null);
    }

    #[test]
    fn paginate_cuts_pages() {
        let paginate = Paginate { page: 1, limit: 2 };
        assert_eq!(paginate.apply(vec![1, 2, 3, 4, 5]).unwrap(), vec![3, 4]);

        let last = Paginate { page: 2, limit: 2 };
        assert_eq!(last.apply(vec![1, 2, 3, 4, 5]).unwrap(), vec![5]);
    }

    #[test]
    fn paginate_out_of_range_reports_page_count() {
        let paginate = Paginate { page: 3, limit: 2 };
        let error = paginate.apply(vec![1, 2, 3]).unwrap_err();
        assert_eq!(error.max_size, Some(2));

        let empty = Paginate { page: 0, limit: 10 };
        assert!(empty.apply(Vec::<u8>::new()).unwrap().is_empty());
    }

    #[test]
    fn paginate_param_validation() {
        assert_eq!(Paginate::from_param(&Value::Null).unwrap(), None);
        assert!(Paginate::from_param(&json!({ "page": 0, "limit": 0 })).is_err());
        assert!(Paginate::from_param(&json!("first")).is_err());
    }
}
