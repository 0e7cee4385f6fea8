use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Protocols a page can reach through the connector. Every message and
/// correlation entry carries one of these so that a single bridge serves all
/// of them.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Cardano,
    Ergo,
}

/// Encoding a page asks the wallet to use for results (`experimental.setReturnType`).
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReturnType {
    #[default]
    Cbor,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn protocol_names_match_wire_format() {
        assert_eq!(Protocol::Cardano.to_string(), "cardano");
        assert_eq!(Protocol::from_str("ergo").unwrap(), Protocol::Ergo);
        assert_eq!(
            serde_json::to_string(&Protocol::Ergo).unwrap(),
            "\"ergo\"".to_string()
        );
    }
}
