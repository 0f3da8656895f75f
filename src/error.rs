//! Custom error types for the adapter.
//!
//! This module defines the primary error type, `GpibError`, for the whole
//! crate. Using the `thiserror` crate, it gives every failure a specific
//! variant so callers can distinguish a dead socket from a silent
//! instrument from a contended bus:
//!
//! - **`Connection`**: the controller is unreachable or the stream was reset.
//! - **`Io`**: low-level socket failures, converted via `#[from]` so `?`
//!   works throughout the transport layer.
//! - **`Timeout`**: no terminated response arrived within the read window.
//! - **`Protocol`**: a response violated the expected line framing, for
//!   example a stream that ends before its terminator.
//! - **`Address`**: a GPIB primary address outside 0-30.
//! - **`Busy`**: the transaction lock was not acquired within the wait bound.
//! - **`Closed`**: the session was explicitly closed and needs a new
//!   connection.
//!
//! Errors are never swallowed or retried inside the crate; they surface to
//! the calling instrument operation, and any I/O-level failure additionally
//! invalidates the session's cached directive state.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the adapter error type.
pub type GpibResult<T> = std::result::Result<T, GpibError>;

/// Errors surfaced by controller, session and instrument operations.
#[derive(Error, Debug)]
pub enum GpibError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("GPIB address {0} is outside the valid range 0-30")]
    Address(u8),

    #[error("Controller busy: transaction lock not acquired within {0:?}")]
    Busy(Duration),

    #[error("Controller connection is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_error_names_the_valid_range() {
        let err = GpibError::Address(31);
        assert!(err.to_string().contains("31"));
        assert!(err.to_string().contains("0-30"));
    }

    #[test]
    fn io_errors_convert_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: GpibError = io.into();
        assert!(matches!(err, GpibError::Io(_)));
    }

    #[test]
    fn timeout_reports_the_window() {
        let err = GpibError::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }
}
