use clap::Parser;
use dapp_connector_tests::{
    logging::init_logging, test_suites, utils::TestResult, Cli, Config,
};

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::try_from(cli)?;
    let _guards = init_logging(&config.logging)?;

    let results = test_suites::run_all(&config).await?;
    if results.contains(&TestResult::Failed) {
        anyhow::bail!("Some tests failed.");
    }
    Ok(())
}
