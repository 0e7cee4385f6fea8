//! The content-script relay.
//!
//! Sits between a page realm's `window.postMessage` traffic and the
//! extension runtime. It decides whether to inject at all, attaches favicon
//! metadata to connect requests, forwards RPCs to the broker and watches the
//! broker's liveness for protocols that need a heartbeat. It never decides
//! consent itself.
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod error;
pub mod favicon;
pub mod heartbeat;
pub mod relay;
pub mod runtime;

pub use config::{Config, ConfigFile};
pub use error::RelayError;
pub use relay::{Relay, RelayTasks};
pub use runtime::RuntimeChannel;
