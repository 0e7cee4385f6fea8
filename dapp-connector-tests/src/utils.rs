//! Various testing utilities

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use colored::Colorize;
use futures::Future;
use rand::{distributions::Alphanumeric, Rng};
use tracing::info_span;
use tracing_futures::Instrument;

use crate::{
    error::{ConnectorTestError, Result},
    Config,
};

/// How long [`eventually`] keeps polling.
pub const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A fresh origin, so tests sharing a consent store never see each other's
/// grants. Looks like `https://dapp-1h65k35.example`.
pub fn tagged_origin(name: &str) -> String {
    let tag: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect();
    format!("https://{name}-{tag}.example").to_lowercase()
}

/// Lock a std mutex, ignoring poisoning by a panicked test.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Poll `check` until it holds. Fails with [`ConnectorTestError::Timeout`]
/// naming `what` after [`EVENTUALLY_TIMEOUT`].
pub async fn eventually<F, Fut>(what: &'static str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let polling = async {
        while !check().await {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };
    tokio::time::timeout(EVENTUALLY_TIMEOUT, polling)
        .await
        .map_err(|_| ConnectorTestError::Timeout(what))
}

/// Pass a list of async test functions with parameters included.
/// All test functions must return [`Result<()>`].
/// Tests will run in parallel and report the names of any failing test.
/// # Example
/// ```text
/// run_parallel!(config.clone(), test_1(), test_2(&world))
/// ```
#[macro_export]
macro_rules! run_parallel {
    ($config:expr, $($task:expr),+,) => {
        run_parallel!($config, $($task),+)
    };
    ($config:expr, $($task:expr),+) => {
        // Stick this in a scope so it can return a result
        {
            use std::sync::{Arc, Mutex};
            use $crate::{error::ConnectorTestError, utils::TestResult};

            let results = Arc::new(Mutex::new(Vec::new()));
            tokio::try_join!($($crate::utils::run_test_case($config, stringify!($task), $task, results.clone())),+)?;

            let results = $crate::utils::lock(&results).clone();

            Ok::<Vec<TestResult>, ConnectorTestError>(results)
        }
    };
}

/// Run one scenario on its own task and record how it went. Panics from
/// failed assertions are caught and reported instead of aborting the run.
pub async fn run_test_case(
    config: Config,
    name: &str,
    task: impl Future<Output = Result<()>> + Send + 'static,
    results: Arc<Mutex<Vec<TestResult>>>,
) -> Result<()> {
    use futures::FutureExt;

    // `stringify!` hands us the call expression.
    let name = name.split('(').next().unwrap_or(name);

    let (result, detail) = if !config.filters.matches(name) {
        (TestResult::Skipped, "skipped".bright_blue().to_string())
    } else {
        let handle = tokio::spawn(task.instrument(info_span!("test_case", test = name)));

        let panic_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        let outcome = handle.catch_unwind().await;
        std::panic::set_hook(panic_hook);

        match outcome {
            Ok(Ok(Ok(()))) => (TestResult::Passed, "ok".green().to_string()),
            Ok(Ok(Err(e))) => (TestResult::Failed, format!("{}: {e}", "failed".red())),
            Ok(Err(join_error)) if join_error.is_panic() => {
                let panic = join_error.into_panic();
                (
                    TestResult::Failed,
                    format!("{}\n{}", "panicked".red(), panic_message(panic.as_ref())),
                )
            }
            Ok(Err(join_error)) => {
                (TestResult::Failed, format!("{}: {join_error}", "failed".red()))
            }
            Err(_) => (TestResult::Failed, "failed: runner panicked".red().to_string()),
        }
    };

    lock(&results).push(result);
    // One print per case keeps parallel output readable.
    println!("\n{name}:\n{detail}\n");
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestResult {
    Passed,
    Failed,
    Skipped,
}

pub fn report_test_results(results: &[TestResult]) -> String {
    if results.contains(&TestResult::Failed) {
        return "FAILED".red().to_string();
    }
    let skipped = results.iter().filter(|r| **r == TestResult::Skipped).count();
    match skipped {
        0 => "PASSED".green().to_string(),
        n if n == results.len() => "SKIPPED".bright_blue().to_string(),
        n => format!("{} ({n} {})", "PASSED".green(), "SKIPPED".bright_blue()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        let borrowed: Box<dyn std::any::Any + Send> = Box::new("assertion failed");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("left != right"));
        let other: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(borrowed.as_ref()), "assertion failed");
        assert_eq!(panic_message(owned.as_ref()), "left != right");
        assert_eq!(panic_message(other.as_ref()), "<non-string panic payload>");
    }

    #[test]
    fn tagged_origins_are_distinct_and_lowercase() {
        let first = tagged_origin("Dapp");
        let second = tagged_origin("Dapp");
        assert_ne!(first, second);
        assert!(first.starts_with("https://dapp-"));
        assert_eq!(first, first.to_lowercase());
    }

    #[test]
    fn failures_dominate_the_report() {
        use TestResult::*;
        assert!(report_test_results(&[Passed, Failed, Skipped]).contains("FAILED"));
        assert!(report_test_results(&[Skipped, Skipped]).contains("SKIPPED"));
        assert!(report_test_results(&[Passed, Skipped]).contains("1"));
    }

    #[tokio::test]
    async fn eventually_reports_what_it_waited_for() {
        tokio::time::pause();
        let result = eventually("nothing", || async { false }).await;
        assert!(matches!(result, Err(ConnectorTestError::Timeout("nothing"))));
    }
}
