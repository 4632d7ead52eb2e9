//! Error types for the journal subsystem.

use thiserror::Error;

/// Errors that can occur while reading or writing the revision journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The record store could not be read or written.
    #[error("journal store error: {msg}")]
    Store {
        /// Error message describing the issue.
        msg: String,
    },

    /// A stored record failed its integrity check or could not be framed.
    #[error("journal corrupted: {msg}")]
    Corrupted {
        /// Error message describing the corruption.
        msg: String,
    },

    /// The cursor was advanced past its last event.
    #[error("no such element: journal cursor is exhausted")]
    NoSuchElement,

    /// Serialization/deserialization error.
    #[error("serialization error")]
    Serialization(#[from] bincode::Error),

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Result alias for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;
