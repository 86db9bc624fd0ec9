/// Initializes the logger with the `env_logger` crate.
///
/// Verbosity comes from `RUST_LOG`, e.g. `RUST_LOG=sx127x_rs=debug`.
pub fn init_logger() {
    env_logger::init();
}

/// Logger setup for test binaries: output is captured per test and repeated
/// calls are harmless.
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
