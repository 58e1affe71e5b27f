//! Domain-specific error types for rollout.
//!
//! This module defines `RolloutError`, a `thiserror`-based enum that
//! provides typed error variants for the upgrade lifecycle guards and
//! common failure modes. Public API functions return
//! `Result<T, RolloutError>` for programmatic error handling, while
//! trait boundaries continue to use `anyhow::Result`.
//!
//! `RolloutError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically at trait boundaries that return
//! `anyhow::Result`.

use std::io;

use uuid::Uuid;

use crate::model::Version;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent, user-friendly messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)").
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for rollout.
///
/// Provides typed variants for lifecycle guard violations and execution
/// failures, enabling callers to match on error kinds programmatically
/// rather than parsing error message strings.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RolloutError {
    /// The requested cluster does not exist in the inventory.
    #[error("cluster not found: {0}")]
    ClusterNotFound(Uuid),

    /// No matching upgrade task exists. Carries the cluster or upgrade
    /// id the lookup was keyed by.
    #[error("upgrade not found: {0}")]
    UpgradeNotFound(Uuid),

    /// The cluster version is unknown, so no upgrade path can be computed.
    #[error("cluster version is unknown, upgrade is not allowed: {0}")]
    ClusterVersionUnknown(Uuid),

    /// An upgrade can only target a strictly higher version.
    #[error("cannot upgrade from {from} to {to}: target must be a higher version")]
    CannotUpgradeToLowerVersion {
        /// Current cluster version.
        from: Version,
        /// Requested target version.
        to: Version,
    },

    /// An active (in-progress or paused) upgrade already exists for the cluster.
    #[error("an upgrade is already in progress for cluster: {0}")]
    UpgradeAlreadyInProgress(Uuid),

    /// No driver with the given name is registered.
    #[error("unknown upgrade driver: {0}")]
    UnknownDriver(String),

    /// A command execution failed (non-zero exit, spawn failure, wait failure, etc.).
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The command that was executed.
        command: String,
        /// Human-readable reason for the failure: exit code, signal
        /// information, or a description of the internal error.
        status: String,
    },

    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred, typically a file
        /// path or an operation description with a path.
        context: String,
        /// Human-readable description of the I/O failure, derived from
        /// [`io_error_kind_message`] for consistent formatting.
        message: String,
        /// The underlying I/O error, preserved for programmatic inspection.
        #[source]
        source: std::io::Error,
    },
}

impl RolloutError {
    /// Creates an `Io` variant with the `message` field automatically derived
    /// from the `source` via [`io_error_kind_message`].
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }
}
