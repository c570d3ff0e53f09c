//! Utilities module for logging, errors, and formatting helpers

pub mod error;
pub mod logging;

pub use error::{Result, ResultExt, ServeError};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Format a byte count in a human-readable way
pub fn format_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;

    let b = bytes as f64;
    if b < KIB {
        format!("{} B", bytes)
    } else if b < MIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / MIB)
    }
}
