//! `window.postMessage` for one browser window.
//!
//! Every listener attached to a window sees every message posted to it,
//! including messages it posted itself and messages from unrelated scripts.
//! Listeners filter by target origin and drop anything that is not a
//! [`PageMessage`].

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{types::message::PageMessage, ConnectorError};

const BUFFER_SIZE: usize = 64;

/// One posted message: its payload and the `targetOrigin` it was posted with.
#[derive(Debug, Clone)]
pub struct WindowEvent {
    pub target_origin: String,
    pub data: Value,
}

/// The message bus of a single window. Cheap to clone; clones share the bus.
#[derive(Debug, Clone)]
pub struct WindowBus {
    origin: String,
    sender: broadcast::Sender<WindowEvent>,
}

impl WindowBus {
    pub fn new(origin: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(BUFFER_SIZE);
        Self {
            origin: origin.into(),
            sender,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Post `message` scoped to the window's own origin.
    pub fn post_message(&self, message: &PageMessage) -> Result<(), ConnectorError> {
        let data = serde_json::to_value(message)?;
        self.post_raw(self.origin.clone(), data);
        Ok(())
    }

    /// Post arbitrary data, as any script in the window could.
    pub fn post_raw(&self, target_origin: String, data: Value) {
        // Nobody listening is not an error for postMessage.
        if self
            .sender
            .send(WindowEvent {
                target_origin,
                data,
            })
            .is_err()
        {
            debug!("Posted message with no listeners attached.");
        }
    }

    pub fn subscribe(&self) -> WindowListener {
        WindowListener {
            origin: self.origin.clone(),
            receiver: self.sender.subscribe(),
        }
    }
}

/// A `message` event listener attached to a [`WindowBus`].
#[derive(Debug)]
pub struct WindowListener {
    origin: String,
    receiver: broadcast::Receiver<WindowEvent>,
}

impl WindowListener {
    /// Wait for the next connector message addressed to this window's origin.
    pub async fn receive(&mut self) -> Result<PageMessage, ConnectorError> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Window listener lagged, {} messages dropped.", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ConnectorError::NoMessageReceived)
                }
            };

            if event.target_origin != self.origin && event.target_origin != "*" {
                continue;
            }
            match serde_json::from_value(event.data) {
                Ok(message) => return Ok(message),
                Err(e) => debug!("Ignoring foreign window message: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::protocol::Protocol;
    use serde_json::json;

    #[tokio::test]
    async fn listeners_see_own_origin_messages_only() {
        let bus = WindowBus::new("https://dapp.example");
        let mut listener = bus.subscribe();

        bus.post_raw("https://evil.example".to_string(), json!({ "type": "disconnect", "protocol": "cardano" }));
        bus.post_raw("https://dapp.example".to_string(), json!({ "type": "wallet_ad", "x": 1 }));
        bus.post_message(&PageMessage::Connected {
            protocol: Protocol::Cardano,
        })
        .unwrap();

        let message = listener.receive().await.unwrap();
        assert_eq!(
            message,
            PageMessage::Connected {
                protocol: Protocol::Cardano
            }
        );
    }

    #[tokio::test]
    async fn every_listener_receives_every_message() {
        let bus = WindowBus::new("https://dapp.example");
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.post_message(&PageMessage::ScriptInjected).unwrap();

        assert_eq!(first.receive().await.unwrap(), PageMessage::ScriptInjected);
        assert_eq!(second.receive().await.unwrap(), PageMessage::ScriptInjected);
    }
}
