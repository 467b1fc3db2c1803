//! Logger setup. Everything in the crate logs through the `log` facade.

use log::LevelFilter;
use std::str::FromStr;

/// Installs `env_logger` at `level` unless `RUST_LOG` is set, which wins.
/// Calling it twice is harmless.
pub fn init(level: &str) {
    let filter = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(filter);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

/// Logger for tests: debug level, captured by the test harness.
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test();
        init("warn");
        init("not-a-level");
    }
}
