//! Utilities for logging.

use tracing_subscriber::EnvFilter;

/// Logger for tests. Output is captured by the test harness.
///
/// Filtering follows `RUST_LOG`. Safe to call from every test, only the first
/// call installs the subscriber.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice() {
        init_test();
        init_test();
        tracing::info!("logging after repeated init");
    }
}
