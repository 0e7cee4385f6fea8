//! Confirmation popups.
//!
//! A popup is opened by the broker for a single connect or signing request.
//! It asks the broker what to show, lets the user decide, reports at most one
//! decision and closes itself.
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]
#![forbid(rustdoc::broken_intra_doc_links)]

pub mod error;
pub mod view;
pub mod window;

pub use error::PopupError;
pub use view::{ConnectView, SigningView, View};
pub use window::{BrokerPort, Choice, ConfirmationWindow, Outcome, Reviewer, WindowControl};
