use std::path::PathBuf;
use thiserror::Error;

/// Main result type for dbrefresh operations
pub type Result<T> = std::result::Result<T, RefreshError>;

/// Main error type for dbrefresh operations
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Patch application errors
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    /// Snapshot cache and acquisition errors
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Restore client errors
    #[error("Restore error: {0}")]
    Restore(#[from] RestoreError),

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The operator declined a destructive action
    #[error("Aborted: {reason}")]
    Aborted { reason: String },

    /// Internal errors (should not normally occur)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Patch-specific errors
#[derive(Debug, Error)]
pub enum PatchError {
    /// A statement failed with an error that is not in the ignorable set
    #[error("{file}: statement {index} failed (code {code}): {message}", code = display_code(.code))]
    Statement {
        file: PathBuf,
        index: usize,
        code: Option<u16>,
        statement: String,
        message: String,
    },

    /// Could not open a session against the target database
    #[error("Failed to connect to target database: {message}")]
    Connection { message: String },

    /// Commit at the end of a file failed
    #[error("{file}: commit failed: {message}")]
    Commit { file: PathBuf, message: String },

    /// Patch file could not be read
    #[error("Failed to read patch {path}: {message}")]
    Read { path: PathBuf, message: String },

    /// Patch directory does not exist
    #[error("Patch directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Patch directory exists but cannot be listed
    #[error("Failed to read patch directory {path}: {message}")]
    DirectoryUnreadable { path: PathBuf, message: String },
}

/// Snapshot-specific errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The dump process could not be started or exited unsuccessfully
    #[error("Snapshot acquisition failed: {reason}")]
    AcquisitionFailed { reason: String },

    /// Acquisition ran but no snapshot dated today exists afterwards
    #[error("No snapshot dated {date} in {dir} after acquisition")]
    StillStale { dir: PathBuf, date: String },
}

/// Restore-specific errors
#[derive(Debug, Error)]
pub enum RestoreError {
    /// No loading strategy exists for this platform
    #[error("Unsupported platform: {platform}")]
    UnsupportedPlatform { platform: String },

    /// The client binary could not be started
    #[error("Failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    /// The client binary exited unsuccessfully
    #[error("{action} failed with {status}")]
    CommandFailed { action: String, status: String },
}

fn display_code(code: &Option<u16>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Convenience methods for creating specific errors
impl RefreshError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an aborted error
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl SnapshotError {
    /// Create an acquisition failed error
    pub fn acquisition_failed(reason: impl Into<String>) -> Self {
        Self::AcquisitionFailed {
            reason: reason.into(),
        }
    }
}

impl RestoreError {
    /// Create a command failed error from an exit status
    pub fn command_failed(action: impl Into<String>, status: std::process::ExitStatus) -> Self {
        Self::CommandFailed {
            action: action.into(),
            status: status.to_string(),
        }
    }

    /// Create a spawn error
    pub fn spawn(program: impl Into<String>, error: &std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            message: error.to_string(),
        }
    }
}
