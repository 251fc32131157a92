//! Error types for intervals-core operations.
//! Keep IntervalsFfiError minimal and stable to avoid breaking FFI clients.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// FFI-Compatible Errors (for Swift/Kotlin)
// ═══════════════════════════════════════════════════════════════════════════════

/// FFI-safe error type for use across language boundaries.
///
/// Carries only a message string, which is all the mobile shells display.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum IntervalsFfiError {
    #[error("{message}")]
    General { message: String },
}

impl From<String> for IntervalsFfiError {
    fn from(message: String) -> Self {
        IntervalsFfiError::General { message }
    }
}

impl From<&str> for IntervalsFfiError {
    fn from(message: &str) -> Self {
        IntervalsFfiError::General {
            message: message.to_string(),
        }
    }
}

impl From<IntervalsError> for IntervalsFfiError {
    fn from(err: IntervalsError) -> Self {
        IntervalsFfiError::General {
            message: err.to_string(),
        }
    }
}

/// Error reported by a host notification scheduler.
///
/// Never propagated past the [`crate::notify::Notifier`]; it exists so foreign
/// implementations can say *why* scheduling failed and have it logged.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum NotificationError {
    #[error("notification scheduling failed: {message}")]
    Failed { message: String },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for NotificationError {
    fn from(err: uniffi::UnexpectedUniFFICallbackError) -> Self {
        NotificationError::Failed {
            message: err.reason,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Internal Error (for Rust-only use)
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur in intervals-core operations.
///
/// Lifecycle transitions never produce these (invalid transitions are ignored);
/// they come from store CRUD, persistence and configuration.
#[derive(Debug, thiserror::Error)]
pub enum IntervalsError {
    // ─────────────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Store has not finished hydrating")]
    StoreNotReady,

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project is a default project and cannot be deleted: {0}")]
    ProjectProtected(String),

    #[error("Project name must not be empty")]
    InvalidProjectName,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Another session is already open: {0}")]
    SessionAlreadyOpen(String),

    #[error("Session is completed and can no longer change: {0}")]
    SessionCompleted(String),

    #[error("Invalid status transition for session {id}: {from} -> {to}")]
    InvalidStatusTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Persistence Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Unsupported store schema version {found} (newest known is {supported})")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Data directory not found: {0}")]
    DataDirNotFound(PathBuf),

    #[error("Home directory could not be determined")]
    HomeDirNotFound,
}

/// Convenience type alias for Results using IntervalsError.
pub type Result<T> = std::result::Result<T, IntervalsError>;

impl From<IntervalsError> for String {
    fn from(err: IntervalsError) -> String {
        err.to_string()
    }
}
