//! Wire types, error taxonomy, and other shared context used by every
//! execution context of the dApp connector: the injected page realm, the
//! content-script relay, the background broker and the confirmation popup.
//!
//! Nothing in this crate holds state across requests. Correlation tables and
//! consent records are owned by the crates that use these types.
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(rustdoc::broken_intra_doc_links)]

pub mod constants;
pub mod error;
pub mod infrastructure;
pub mod types;

pub use error::ConnectorError;
