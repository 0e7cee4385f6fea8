//! Constants that are shared between other crates in this workspace.
//! Crate-specific constants should go in their respective crates.

/// Name the cardano wallet object is installed under (`window.cardano.yoroi`).
pub const DEFAULT_WALLET_NAME: &str = "yoroi";

/// Token id meaning "every asset" for cardano balance queries.
pub const CARDANO_ALL_TOKENS: &str = "*";

/// Default token id for ergo balance queries.
pub const ERGO_DEFAULT_TOKEN: &str = "ERG";

/// `info` carried by errors returned from an API object after it was
/// disconnected.
pub const WALLET_DISCONNECTED: &str = "Wallet disconnected";

/// `info` of errors from an API object whose wallet switched accounts.
pub const WALLET_ACCOUNT_CHANGED: &str = "Wallet account changed";

/// Span fields recorded with [`crate::infrastructure::logging::record_field`].
pub mod span_fields {
    pub const REQUEST_ID: &str = "request_id";
    pub const UID: &str = "uid";
    pub const ORIGIN: &str = "origin";
    pub const TAB_ID: &str = "tab_id";
}
