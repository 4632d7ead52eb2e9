//! Error types for the replication subsystem.

use contentrepo_journal::JournalError;
use thiserror::Error;

/// Filter configuration errors, raised by `init` and fatal for module startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration property is absent.
    #[error("{filter}: missing required property '{name}'")]
    MissingProperty {
        /// Filter being configured.
        filter: String,
        /// Name of the missing property.
        name: String,
    },

    /// A configuration property could not be parsed.
    #[error("{filter}: malformed value for '{name}': {value:?}")]
    Malformed {
        /// Filter being configured.
        filter: String,
        /// Name of the offending property.
        name: String,
        /// The raw value (or the offending entry of a list).
        value: String,
    },

    /// `init` was called on a filter that is already configured.
    #[error("{filter}: already initialized")]
    AlreadyInitialized {
        /// Filter being configured.
        filter: String,
    },
}

/// Errors that can occur in the replication subsystem.
#[derive(Debug, Error)]
pub enum ReplError {
    /// Journal read error.
    #[error("journal error")]
    Journal(#[from] JournalError),

    /// Filter configuration error.
    #[error("filter configuration error")]
    Config(#[from] ConfigError),

    /// Node snapshots could not be loaded.
    #[error("node source error: {msg}")]
    NodeSource {
        /// Error message describing the issue.
        msg: String,
    },

    /// A replication pass did not complete on the blocking pool.
    #[error("replication task failed: {msg}")]
    Task {
        /// Error message describing the issue.
        msg: String,
    },
}
