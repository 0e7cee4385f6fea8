//! View models handed to whatever draws the popup.

use dapp_connector::types::{
    ids::TabId,
    message::ConnectPrompt,
    protocol::Protocol,
    rpc::Uid,
    signing::{SigningKind, SigningRequest},
};
use serde::Serialize;

use crate::PopupError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectView {
    pub origin: String,
    pub protocol: Protocol,
    /// `None` when the page had no icon we could capture.
    pub favicon: Option<String>,
    pub requests_identification: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningView {
    pub uid: Uid,
    pub tab_id: TabId,
    pub origin: String,
    pub title: &'static str,
    /// The request payload, pretty-printed.
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    Connect(ConnectView),
    Signing(SigningView),
}

pub fn render_connect(prompt: &ConnectPrompt) -> ConnectView {
    ConnectView {
        origin: prompt.origin.clone(),
        protocol: prompt.protocol,
        favicon: Some(prompt.favicon.clone()).filter(|favicon| !favicon.is_empty()),
        requests_identification: prompt.request_identification,
    }
}

pub fn render_signing(request: &SigningRequest) -> Result<SigningView, PopupError> {
    let title = match request.kind {
        SigningKind::Tx => "Sign transaction",
        SigningKind::TxInput => "Sign transaction input",
        SigningKind::Data => "Sign data",
        SigningKind::Submit => "Submit transaction",
    };
    Ok(SigningView {
        uid: request.uid,
        tab_id: request.tab_id,
        origin: request.origin.clone(),
        title,
        details: serde_json::to_string_pretty(&request.payload)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_favicon_is_none() {
        let view = render_connect(&ConnectPrompt {
            origin: "https://dapp.example".to_string(),
            protocol: Protocol::Cardano,
            favicon: String::new(),
            request_identification: false,
        });
        assert_eq!(view.favicon, None);
    }

    #[test]
    fn signing_view_shows_the_payload() {
        let view = render_signing(&SigningRequest {
            uid: Uid(3),
            tab_id: TabId(1),
            origin: "https://dapp.example".to_string(),
            protocol: Protocol::Cardano,
            kind: SigningKind::Data,
            payload: json!({ "address": "addr1", "payload": "cafe" }),
        })
        .unwrap();
        assert_eq!(view.title, "Sign data");
        assert!(view.details.contains("cafe"));
    }
}
