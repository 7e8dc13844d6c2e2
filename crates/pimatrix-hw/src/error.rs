//! Error types for the pimatrix hardware library.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when driving the matrix hardware.
#[derive(Error, Debug)]
pub enum Error {
    /// GPIO line already exported or claimed by another owner.
    #[error("GPIO pin {0} is busy (already exported or claimed)")]
    PinBusy(u32),

    /// A privileged device could not be opened.
    #[error("permission denied opening {0} (root or gpio group membership required)")]
    PermissionDenied(String),

    /// A pin read or write failed at the syscall level.
    #[error("I/O error on GPIO pin {pin}: {source}")]
    PinIo {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    /// The requested physical range overlaps a window this process already holds.
    #[error("mapping at physical address {addr:#010x} conflicts with an existing window")]
    MappingConflict { addr: u64 },

    /// Register access outside the mapped window.
    #[error("register offset {offset:#06x} out of range for {size} byte window")]
    RegisterOutOfRange { offset: usize, size: usize },

    /// Register access after the window was unmapped.
    #[error("register window is closed")]
    WindowClosed,

    /// PIO program exceeds instruction memory.
    #[error("PIO program of {len} words exceeds instruction memory ({capacity} words)")]
    ProgramTooLarge { len: usize, capacity: usize },

    /// Operation not valid in the state machine's current state.
    #[error("state machine {sm} is {state}, operation requires {required}")]
    InvalidState {
        sm: usize,
        state: &'static str,
        required: &'static str,
    },

    /// TX FIFO stayed full for the whole timeout. Flow-control
    /// backpressure, not a device fault.
    #[error("timed out after {timeout:?} waiting for FIFO space on state machine {sm}")]
    FifoTimeout { sm: usize, timeout: Duration },

    /// Row index beyond what the configured address lines can select.
    #[error("row {row} out of range for {rows} addressable rows")]
    RowOutOfRange { row: usize, rows: usize },

    /// A signal-ordering invariant was about to be broken. Programming
    /// error; fails loudly instead of rendering artifacts.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// Scan-out failed mid-frame; carries the row for context.
    #[error("scan-out failed at row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: Box<Error>,
    },

    /// Rejected matrix configuration.
    #[error("invalid matrix configuration: {0}")]
    InvalidConfig(String),

    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for conditions the caller may retry or skip past: a busy
    /// resource or FIFO backpressure. Everything else is fatal.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::PinBusy(_) | Error::MappingConflict { .. } | Error::FifoTimeout { .. } => true,
            Error::Row { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::PinBusy(4).is_recoverable());
        assert!(Error::FifoTimeout {
            sm: 0,
            timeout: Duration::from_millis(100)
        }
        .is_recoverable());
        assert!(!Error::WindowClosed.is_recoverable());
        assert!(!Error::ProtocolViolation("data change with output enabled").is_recoverable());
    }

    #[test]
    fn test_row_wrapper_preserves_classification() {
        let recoverable = Error::Row {
            row: 3,
            source: Box::new(Error::FifoTimeout {
                sm: 1,
                timeout: Duration::from_millis(50),
            }),
        };
        assert!(recoverable.is_recoverable());

        let fatal = Error::Row {
            row: 3,
            source: Box::new(Error::WindowClosed),
        };
        assert!(!fatal.is_recoverable());
        assert!(fatal.to_string().contains("row 3"));
    }
}
