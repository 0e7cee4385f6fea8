use crate::{
    config::Config,
    error::Result,
    utils::{report_test_results, TestResult},
};

pub mod config_files;
pub mod connect;
pub mod correlation;
pub mod heartbeat;
pub mod injection;
pub mod persistence;
pub mod signing;

pub async fn run_all(config: &Config) -> Result<Vec<TestResult>> {
    let config_file_results = config_files::run_tests(config).await?;
    let injection_results = injection::run_tests(config).await?;
    let connect_results = connect::run_tests(config).await?;
    let correlation_results = correlation::run_tests(config).await?;
    let signing_results = signing::run_tests(config).await?;
    let heartbeat_results = heartbeat::run_tests(config).await?;
    let persistence_results = persistence::run_tests(config).await?;

    println!(
        "config file tests: {}",
        report_test_results(&config_file_results)
    );
    println!("injection tests: {}", report_test_results(&injection_results));
    println!("connect tests: {}", report_test_results(&connect_results));
    println!(
        "correlation tests: {}",
        report_test_results(&correlation_results)
    );
    println!("signing tests: {}", report_test_results(&signing_results));
    println!("heartbeat tests: {}", report_test_results(&heartbeat_results));
    println!(
        "persistence tests: {}",
        report_test_results(&persistence_results)
    );

    Ok([
        config_file_results,
        injection_results,
        connect_results,
        correlation_results,
        signing_results,
        heartbeat_results,
        persistence_results,
    ]
    .concat())
}
