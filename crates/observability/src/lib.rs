//! Tracing setup shared by the binary and tests.

/// Initialize process-wide tracing with the given output format.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_with(format: LogFormat) {
    tracing::init_with(format);
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use self::tracing::{LogFormat, UnknownLogFormat};
