//! Process-wide tracing setup shared by the binaries.

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

/// Subscriber installation and output formats.
pub mod tracing;

pub use self::tracing::LogFormat;
