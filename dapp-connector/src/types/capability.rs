//! The fixed, versioned description of what a page may call.
//!
//! The page realm only ever builds API objects for functions listed here and
//! the broker refuses anything that does not parse into a [`Function`]. Names
//! are the wire names sent in [`RpcRequest::function`](super::rpc::RpcRequest).

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    types::{protocol::Protocol, signing::SigningKind},
    ConnectorError,
};

/// Version reported as `apiVersion` on `window.cardano.<name>`.
pub const API_VERSION: &str = "0.3.0";

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum CardanoFunction {
    GetNetworkId,
    GetBalance,
    GetUsedAddresses,
    GetUnusedAddresses,
    GetRewardAddresses,
    GetChangeAddress,
    GetUtxos,
    GetCollateral,
    SubmitTx,
    SignTx,
    SignData,
    #[strum(serialize = "cip95_get_pub_drep_key")]
    Cip95GetPubDrepKey,
    #[strum(serialize = "cip95_get_registered_pub_stake_keys")]
    Cip95GetRegisteredPubStakeKeys,
    #[strum(serialize = "cip95_get_unregistered_pub_stake_keys")]
    Cip95GetUnregisteredPubStakeKeys,
    #[strum(serialize = "cip95_sign_data")]
    Cip95SignData,
    AuthSignHexPayload,
    AuthCheckHexPayload,
    CreateTx,
    ListNfts,
    Ping,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErgoFunction {
    GetBalance,
    GetUtxos,
    GetUsedAddresses,
    GetUnusedAddresses,
    GetChangeAddress,
    SignTx,
    SignTxInput,
    SubmitTx,
    Ping,
}

/// A function of one protocol's API.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Function {
    Cardano(CardanoFunction),
    Ergo(ErgoFunction),
}

impl Function {
    pub fn parse(protocol: Protocol, name: &str) -> Result<Self, ConnectorError> {
        let unknown = || ConnectorError::UnknownFunction {
            protocol,
            function: name.to_string(),
        };
        match protocol {
            Protocol::Cardano => CardanoFunction::from_str(name)
                .map(Self::Cardano)
                .map_err(|_| unknown()),
            Protocol::Ergo => ErgoFunction::from_str(name)
                .map(Self::Ergo)
                .map_err(|_| unknown()),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Cardano(_) => Protocol::Cardano,
            Self::Ergo(_) => Protocol::Ergo,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cardano(function) => (*function).into(),
            Self::Ergo(function) => (*function).into(),
        }
    }

    /// Inclusive range of accepted parameter counts. Optional trailing
    /// parameters may be omitted.
    pub fn arity(&self) -> (usize, usize) {
        use CardanoFunction as C;
        use ErgoFunction as E;

        match self {
            Self::Cardano(function) => match function {
                C::GetNetworkId
                | C::GetUnusedAddresses
                | C::GetRewardAddresses
                | C::GetChangeAddress
                | C::Cip95GetPubDrepKey
                | C::Cip95GetRegisteredPubStakeKeys
                | C::Cip95GetUnregisteredPubStakeKeys
                | C::ListNfts
                | C::Ping => (0, 0),
                C::GetBalance | C::GetUsedAddresses | C::GetCollateral => (0, 1),
                C::GetUtxos => (0, 2),
                C::SubmitTx | C::AuthSignHexPayload | C::CreateTx => (1, 1),
                C::SignTx => (1, 2),
                C::SignData | C::Cip95SignData | C::AuthCheckHexPayload => (2, 2),
            },
            Self::Ergo(function) => match function {
                E::GetUnusedAddresses | E::GetChangeAddress | E::Ping => (0, 0),
                E::GetBalance | E::GetUsedAddresses => (0, 1),
                E::GetUtxos => (0, 3),
                E::SignTx | E::SubmitTx => (1, 1),
                E::SignTxInput => (2, 2),
            },
        }
    }

    pub fn check_arity(&self, actual: usize) -> Result<(), ConnectorError> {
        let (min, max) = self.arity();
        if actual < min || actual > max {
            return Err(ConnectorError::InvalidParameterCount {
                function: self.name(),
                min,
                max,
                actual,
            });
        }
        Ok(())
    }

    /// The kind of confirmation this function asks the user for, if any.
    /// Whether submission is actually confirmed is a broker setting.
    pub fn signing_kind(&self) -> Option<SigningKind> {
        use CardanoFunction as C;
        use ErgoFunction as E;

        match self {
            Self::Cardano(C::SignTx | C::CreateTx) | Self::Ergo(E::SignTx) => Some(SigningKind::Tx),
            Self::Ergo(E::SignTxInput) => Some(SigningKind::TxInput),
            Self::Cardano(C::SignData | C::Cip95SignData) => Some(SigningKind::Data),
            Self::Cardano(C::SubmitTx) | Self::Ergo(E::SubmitTx) => Some(SigningKind::Submit),
            _ => None,
        }
    }
}

/// Wire name of the `isEnabled` round-trip for `protocol`. It is carried as an
/// RPC but answered by the broker from the consent store, not by a handler.
pub fn is_enabled_function(protocol: Protocol) -> String {
    format!("is_enabled/{protocol}")
}

/// The protocol named by an [`is_enabled_function`] name.
pub fn parse_is_enabled(function: &str) -> Option<Protocol> {
    function
        .strip_prefix("is_enabled/")
        .and_then(|protocol| Protocol::from_str(protocol).ok())
}

/// A CIP extension the wallet advertises.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub cip: u32,
}

/// Static part of `window.cardano.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDescriptor {
    pub name: String,
    pub icon: String,
    pub api_version: String,
    pub supported_extensions: Vec<Extension>,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: icon.into(),
            api_version: API_VERSION.to_string(),
            supported_extensions: vec![Extension { cip: 95 }],
        }
    }

    pub fn supports(&self, cip: u32) -> bool {
        self.supported_extensions.iter().any(|e| e.cip == cip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn names_parse_back() {
        for function in CardanoFunction::iter() {
            let parsed = Function::parse(Protocol::Cardano, &function.to_string()).unwrap();
            assert_eq!(parsed, Function::Cardano(function));
        }
        for function in ErgoFunction::iter() {
            let parsed = Function::parse(Protocol::Ergo, &function.to_string()).unwrap();
            assert_eq!(parsed, Function::Ergo(function));
        }
    }

    #[test]
    fn cip95_names_are_prefixed() {
        assert_eq!(
            CardanoFunction::Cip95GetPubDrepKey.to_string(),
            "cip95_get_pub_drep_key"
        );
        assert_eq!(CardanoFunction::GetUtxos.to_string(), "get_utxos");
    }

    #[test]
    fn functions_are_scoped_to_their_protocol() {
        assert!(Function::parse(Protocol::Ergo, "get_network_id").is_err());
        assert!(Function::parse(Protocol::Cardano, "sign_tx_input").is_err());
        assert!(Function::parse(Protocol::Cardano, "__proto__").is_err());
    }

    #[test]
    fn arity_is_enforced() {
        let sign_data = Function::Cardano(CardanoFunction::SignData);
        assert!(sign_data.check_arity(2).is_ok());
        assert!(sign_data.check_arity(1).is_err());

        let get_utxos = Function::Ergo(ErgoFunction::GetUtxos);
        assert!(get_utxos.check_arity(0).is_ok());
        assert!(get_utxos.check_arity(4).is_err());
    }

    #[test]
    fn signing_kinds() {
        assert_eq!(
            Function::Cardano(CardanoFunction::SignData).signing_kind(),
            Some(SigningKind::Data)
        );
        assert_eq!(
            Function::Ergo(ErgoFunction::SignTxInput).signing_kind(),
            Some(SigningKind::TxInput)
        );
        assert_eq!(
            Function::Cardano(CardanoFunction::GetBalance).signing_kind(),
            None
        );
    }

    #[test]
    fn is_enabled_names() {
        assert_eq!(is_enabled_function(Protocol::Ergo), "is_enabled/ergo");
        assert_eq!(parse_is_enabled("is_enabled/cardano"), Some(Protocol::Cardano));
        assert_eq!(parse_is_enabled("get_balance"), None);
    }

    #[test]
    fn descriptor_advertises_cip95() {
        let descriptor = WalletDescriptor::new("yoroi", "data:image/png;base64,");
        assert!(descriptor.supports(95));
        assert_eq!(descriptor.api_version, API_VERSION);
    }
}
