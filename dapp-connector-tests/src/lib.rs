//! End-to-end tests for the dApp connector.
//!
//! Every test builds a [`World`](harness::World): a broker, a consent store,
//! popups driven by a scripted reviewer and as many tabs as the test opens,
//! each with its own page realm and relay. Nothing leaves the process.
#![warn(unused_results)]
#![warn(future_incompatible)]
#![warn(unused)]

pub mod config;
pub mod error;
pub mod harness;
pub mod logging;
pub mod test_suites;
pub mod utils;

use clap::Parser;
use std::path::PathBuf;

pub use config::Config;
pub use utils::TestResult;

#[derive(Debug, Parser)]
pub struct Cli {
    /// Optional runner config with logging settings.
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Only run tests whose name contains one of these.
    #[clap(long = "filter")]
    pub filters: Option<Vec<String>>,
}
