//! Tracing/logging setup shared by binaries and integration tests.

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Environment variable selecting the log output format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "STOCKLOCK_LOG_FORMAT";

/// Initialize process-wide tracing.
///
/// Output is JSON unless `STOCKLOCK_LOG_FORMAT` selects `pretty`. This is safe
/// to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let format = LogFormat::from_setting(std::env::var(LOG_FORMAT_ENV).ok().as_deref());
    tracing::init(format);
}
