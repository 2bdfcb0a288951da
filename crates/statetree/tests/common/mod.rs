pub mod capture;
pub mod fixtures;

/// Routes `tracing` output to the test harness. Set `RUST_LOG=statetree=trace`
/// to see action events while debugging a test.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
