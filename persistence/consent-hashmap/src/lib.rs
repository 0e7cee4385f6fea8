//! This crate is an in-memory implementation of the broker's consent store.
//! Grants last as long as the process.
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(rustdoc::broken_intra_doc_links)]

pub mod api;

pub use api::HashmapConsentStore;
