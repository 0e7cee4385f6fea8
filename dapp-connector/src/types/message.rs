//! Message vocabularies of the three channels.
//!
//! - [`PageMessage`] travels over `window.postMessage` between the page realm
//!   and the relay.
//! - [`RuntimeRequest`], [`RuntimeReply`] and [`BrokerEvent`] travel over the
//!   extension runtime between a relay and the broker.
//! - [`PopupMessage`] and [`PopupReply`] travel between a confirmation popup
//!   and the broker.
//!
//! All of them are discriminated by a string `type` field on the wire.

use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use strum::Display as StrumDisplay;

use crate::{
    types::{
        connection::WalletAuth,
        error_codes::ErrorObject,
        ids::{TabId, WalletId, WindowId},
        protocol::Protocol,
        rpc::{RpcRequest, RpcResponse, Uid},
        signing::SigningRequest,
    },
    ConnectorError,
};

/// The `type` of a [`PageMessage`]. Protocol-scoped types carry the protocol
/// as a `/<protocol>` suffix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageType {
    ConnectRequest(Protocol),
    ConnectResponse(Protocol),
    RpcRequest,
    RpcResponse,
    Connected,
    ScriptInjected,
    Disconnect,
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectRequest(protocol) => write!(f, "connector_connect_request/{protocol}"),
            Self::ConnectResponse(protocol) => write!(f, "yoroi_connect_response/{protocol}"),
            Self::RpcRequest => write!(f, "connector_rpc_request"),
            Self::RpcResponse => write!(f, "connector_rpc_response"),
            Self::Connected => write!(f, "connector_connected"),
            Self::ScriptInjected => write!(f, "scripted_injected"),
            Self::Disconnect => write!(f, "disconnect"),
        }
    }
}

impl FromStr for MessageType {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ConnectorError::UnknownMessageType(s.to_string());

        if let Some((kind, protocol)) = s.split_once('/') {
            let protocol = Protocol::from_str(protocol).map_err(|_| unknown())?;
            return match kind {
                "connector_connect_request" => Ok(Self::ConnectRequest(protocol)),
                "yoroi_connect_response" => Ok(Self::ConnectResponse(protocol)),
                _ => Err(unknown()),
            };
        }

        match s {
            "connector_rpc_request" => Ok(Self::RpcRequest),
            "connector_rpc_response" => Ok(Self::RpcResponse),
            "connector_connected" => Ok(Self::Connected),
            "scripted_injected" => Ok(Self::ScriptInjected),
            "disconnect" => Ok(Self::Disconnect),
            _ => Err(unknown()),
        }
    }
}

/// Body of `connector_connect_request/<protocol>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default)]
    pub request_identification: bool,
    #[serde(default)]
    pub only_silent: bool,
}

/// Body of `yoroi_connect_response/<protocol>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<WalletAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<ErrorObject>,
}

impl ConnectResponse {
    pub fn accepted(auth: Option<WalletAuth>) -> Self {
        Self {
            success: true,
            auth,
            err: None,
        }
    }

    pub fn refused(err: ErrorObject) -> Self {
        Self {
            success: false,
            auth: None,
            err: Some(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProtocolBody {
    protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DisconnectBody {
    protocol: Protocol,
    #[serde(default)]
    reason: DisconnectReason,
}

/// Messages exchanged over `window.postMessage`.
#[derive(Debug, Clone, PartialEq)]
pub enum PageMessage {
    ConnectRequest {
        protocol: Protocol,
        request: ConnectRequest,
    },
    ConnectResponse {
        protocol: Protocol,
        response: ConnectResponse,
    },
    RpcRequest(RpcRequest),
    RpcResponse(RpcResponse),
    Connected {
        protocol: Protocol,
    },
    ScriptInjected,
    Disconnect {
        protocol: Protocol,
        reason: DisconnectReason,
    },
}

impl PageMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ConnectRequest { protocol, .. } => MessageType::ConnectRequest(*protocol),
            Self::ConnectResponse { protocol, .. } => MessageType::ConnectResponse(*protocol),
            Self::RpcRequest(_) => MessageType::RpcRequest,
            Self::RpcResponse(_) => MessageType::RpcResponse,
            Self::Connected { .. } => MessageType::Connected,
            Self::ScriptInjected => MessageType::ScriptInjected,
            Self::Disconnect { .. } => MessageType::Disconnect,
        }
    }

    fn body(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::ConnectRequest { request, .. } => serde_json::to_value(request),
            Self::ConnectResponse { response, .. } => serde_json::to_value(response),
            Self::RpcRequest(request) => serde_json::to_value(request),
            Self::RpcResponse(response) => serde_json::to_value(response),
            Self::Connected { protocol } => serde_json::to_value(ProtocolBody {
                protocol: *protocol,
            }),
            Self::Disconnect { protocol, reason } => serde_json::to_value(DisconnectBody {
                protocol: *protocol,
                reason: *reason,
            }),
            Self::ScriptInjected => Ok(Value::Object(Map::new())),
        }
    }

    fn from_parts(message_type: MessageType, body: Value) -> Result<Self, ConnectorError> {
        Ok(match message_type {
            MessageType::ConnectRequest(protocol) => Self::ConnectRequest {
                protocol,
                request: serde_json::from_value(body)?,
            },
            MessageType::ConnectResponse(protocol) => Self::ConnectResponse {
                protocol,
                response: serde_json::from_value(body)?,
            },
            MessageType::RpcRequest => Self::RpcRequest(serde_json::from_value(body)?),
            MessageType::RpcResponse => Self::RpcResponse(serde_json::from_value(body)?),
            MessageType::Connected => {
                let body: ProtocolBody = serde_json::from_value(body)?;
                Self::Connected {
                    protocol: body.protocol,
                }
            }
            MessageType::ScriptInjected => Self::ScriptInjected,
            MessageType::Disconnect => {
                let body: DisconnectBody = serde_json::from_value(body)?;
                Self::Disconnect {
                    protocol: body.protocol,
                    reason: body.reason,
                }
            }
        })
    }
}

/// Flat wire form: `{"type": "...", ...body}`.
#[derive(Serialize, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(flatten)]
    body: Map<String, Value>,
}

impl Serialize for PageMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self.body().map_err(ser::Error::custom)? {
            Value::Object(body) => body,
            _ => return Err(ser::Error::custom("message body is not an object")),
        };
        RawMessage {
            message_type: self.message_type().to_string(),
            body,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PageMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawMessage::deserialize(deserializer)?;
        let message_type = MessageType::from_str(&raw.message_type).map_err(de::Error::custom)?;
        Self::from_parts(message_type, Value::Object(raw.body)).map_err(de::Error::custom)
    }
}

/// Relay to broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeRequest {
    #[serde(rename = "connector_connect")]
    Connect {
        protocol: Protocol,
        origin: String,
        request_identification: bool,
        only_silent: bool,
        favicon: String,
    },
    IsEnabled {
        protocol: Protocol,
        origin: String,
    },
    #[serde(rename = "connector_rpc_request")]
    Rpc(RpcRequest),
    Ping {
        protocol: Protocol,
        origin: String,
    },
}

impl RuntimeRequest {
    pub fn origin(&self) -> &str {
        match self {
            Self::Connect { origin, .. }
            | Self::IsEnabled { origin, .. }
            | Self::Ping { origin, .. } => origin,
            Self::Rpc(request) => &request.origin,
        }
    }
}

/// Broker to relay, answering one [`RuntimeRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeReply {
    Connect(ConnectResponse),
    IsEnabled { enabled: bool },
    Rpc(RpcResponse),
    Pong,
}

/// Why a connection ended. Pages that omit it on the wire get `Revoked`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, StrumDisplay)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DisconnectReason {
    /// The user removed the grant from wallet settings.
    #[default]
    Revoked,
    /// The wallet switched accounts or locked.
    WalletDisconnected,
    /// The relay lost the background.
    ConnectionLost,
}

/// Broker to relay, unsolicited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerEvent {
    Disconnect {
        origin: String,
        protocol: Protocol,
        reason: DisconnectReason,
    },
}

/// Confirmation popup to broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PopupMessage {
    ConnectRetrieveData {
        window_id: WindowId,
    },
    ConnectResponse {
        window_id: WindowId,
        accepted: bool,
        wallet_id: Option<WalletId>,
    },
    TxSignWindowRetrieveData {
        window_id: WindowId,
    },
    /// Decisions name the window they were made in; only the request that
    /// window shows can be decided.
    SignConfirmed {
        window_id: WindowId,
        uid: Uid,
        tab_id: TabId,
    },
    SignRejected {
        window_id: WindowId,
        uid: Uid,
        tab_id: TabId,
    },
}

/// What a connect popup shows the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPrompt {
    pub origin: String,
    pub protocol: Protocol,
    pub favicon: String,
    pub request_identification: bool,
}

/// Broker to confirmation popup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PopupReply {
    ConnectData { prompt: Option<ConnectPrompt> },
    SigningData { request: Option<SigningRequest> },
    Ack,
}

/// Page a popup window opens on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PopupRoute {
    Connect,
    Sign,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_types_carry_protocol_suffix() {
        assert_eq!(
            MessageType::ConnectRequest(Protocol::Ergo).to_string(),
            "connector_connect_request/ergo"
        );
        assert_eq!(
            MessageType::from_str("yoroi_connect_response/cardano").unwrap(),
            MessageType::ConnectResponse(Protocol::Cardano)
        );
        assert!(MessageType::from_str("connector_connect_request/bitcoin").is_err());
        assert!(MessageType::from_str("connector_rpc_request/cardano").is_err());
    }

    #[test]
    fn page_messages_are_flat() {
        let message = PageMessage::ConnectRequest {
            protocol: Protocol::Cardano,
            request: ConnectRequest {
                request_identification: true,
                only_silent: false,
            },
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "connector_connect_request/cardano",
                "requestIdentification": true,
                "onlySilent": false,
            })
        );

        let response: PageMessage = serde_json::from_value(json!({
            "type": "connector_rpc_response",
            "uid": 9,
            "ok": "addr_test1",
        }))
        .unwrap();
        assert_eq!(
            response,
            PageMessage::RpcResponse(RpcResponse::ok(Uid(9), json!("addr_test1")))
        );
    }

    #[test]
    fn disconnect_carries_its_reason() {
        let message = PageMessage::Disconnect {
            protocol: Protocol::Cardano,
            reason: DisconnectReason::WalletDisconnected,
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "disconnect",
                "protocol": "cardano",
                "reason": "wallet_disconnected",
            })
        );

        let bare: PageMessage =
            serde_json::from_value(json!({ "type": "disconnect", "protocol": "ergo" })).unwrap();
        assert_eq!(
            bare,
            PageMessage::Disconnect {
                protocol: Protocol::Ergo,
                reason: DisconnectReason::Revoked,
            }
        );
    }

    #[test]
    fn unknown_page_messages_fail_to_parse() {
        let foreign = json!({ "type": "some_other_extension", "data": 1 });
        assert!(serde_json::from_value::<PageMessage>(foreign).is_err());
    }

    #[test]
    fn runtime_messages_are_tagged() {
        let ping = RuntimeRequest::Ping {
            protocol: Protocol::Ergo,
            origin: "https://dapp.example".to_string(),
        };
        assert_eq!(serde_json::to_value(&ping).unwrap()["type"], json!("ping"));

        let reply = RuntimeReply::Rpc(RpcResponse::ok(Uid(1), json!(true)));
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value, json!({ "type": "rpc", "uid": 1, "ok": true }));
        assert_eq!(serde_json::from_value::<RuntimeReply>(value).unwrap(), reply);
    }

    #[test]
    fn popup_decisions_use_wire_names() {
        let confirmed = PopupMessage::SignConfirmed {
            window_id: WindowId(3),
            uid: Uid(7),
            tab_id: TabId(1),
        };
        assert_eq!(
            serde_json::to_value(&confirmed).unwrap(),
            json!({ "type": "sign_confirmed", "window_id": 3, "uid": 7, "tab_id": 1 })
        );
    }
}
