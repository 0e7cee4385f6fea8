use dapp_connector_tests::{test_suites, Config, TestResult};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_suite_passes() {
    let results = test_suites::run_all(&Config::default()).await.unwrap();
    assert!(!results.is_empty());
    assert!(!results.contains(&TestResult::Failed));
}
