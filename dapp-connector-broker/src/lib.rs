//! The background broker.
//!
//! The broker is the only component allowed to change consent records or
//! signing tables. Relays and confirmation popups send it messages; it
//! consults the [`ConsentStore`], opens confirmation windows through the
//! [`WindowManager`] and dispatches accepted calls to the [`WalletStore`] and
//! [`Signer`].
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(rustdoc::broken_intra_doc_links)]

pub mod broker;
pub mod collaborators;
pub mod config;
pub mod consent;
pub mod error;

pub(crate) mod operations;

pub use broker::{Broker, Collaborators};
pub use collaborators::{
    AddressKind, Signer, TabPort, UtxoQuery, WalletScope, WalletStore, WalletStoreError,
    WindowError, WindowManager,
};
pub use config::{Config, ConfigFile, WindowGeometry};
pub use consent::{ConsentStore, ConsentStoreError};
pub use error::BrokerError;
