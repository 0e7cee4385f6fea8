//! This crate is a file-backed implementation of the broker's consent store.
//! Every record lives in one JSON document that is rewritten on each save.
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(rustdoc::broken_intra_doc_links)]

mod api;
mod config;
mod error;

pub use api::JsonConsentStore;
pub use config::Config;
pub use error::JsonStoreError;
