//! The code injected into a dApp's JS realm.
//!
//! A [`Realm`] installs one wallet object per protocol
//! (`window.cardano.<name>` and `window.ergo` connectors), turns every API
//! method call into an [`RpcRequest`](dapp_connector::types::rpc::RpcRequest)
//! posted to the relay, and matches responses back to their callers by uid.
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(rustdoc::broken_intra_doc_links)]

pub mod cardano;
pub mod correlation;
pub mod ergo;
pub mod error;
pub mod realm;

pub use cardano::{CardanoApi, CardanoWallet, EnableOptions};
pub use correlation::CorrelationTable;
pub use ergo::{ErgoApi, ErgoConnector};
pub use error::PageError;
pub use realm::Realm;
