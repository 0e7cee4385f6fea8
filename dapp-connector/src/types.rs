//! Types exchanged between the page realm, the relay, the broker and the
//! confirmation popup.

pub mod capability;
pub mod connection;
pub mod error_codes;
pub mod ids;
pub mod injection;
pub mod message;
pub mod protocol;
pub mod rpc;
pub mod signing;
