//! Error types for the funnel editor engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the whole funnel engine.
///
/// Structural variants (`NotFound`, `Validation`) are raised synchronously by
/// document mutations. Environmental variants (`StorageFull`, `Network`,
/// `VersionConflict`) come from the persistence and sync boundaries and are
/// normally translated into observable state rather than propagated.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunnelError {
    /// Referenced page, block, funnel or version does not exist.
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Malformed mutation input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The local durable store rejected a write.
    #[error("Local storage is full: {needed} bytes needed, quota is {quota} bytes")]
    StorageFull { needed: u64, quota: u64 },

    /// The remote store could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote store holds a version that is not older than the pushed one.
    #[error("Version conflict: local version {local_version}, remote version {remote_version}")]
    VersionConflict {
        local_version: u64,
        remote_version: u64,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Schema migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The editor session has been closed.
    #[error("Editor session is closed")]
    SessionClosed,

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FunnelError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a Network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a StorageFull error
    pub fn is_storage_full(&self) -> bool {
        matches!(self, Self::StorageFull { .. })
    }

    /// Check if this is a Network error
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Check if this is a VersionConflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns true for errors caused by the environment rather than by the
    /// caller's input. These are turned into status flags for autosave.
    pub fn is_environmental(&self) -> bool {
        matches!(
            self,
            Self::StorageFull { .. } | Self::Network(_) | Self::VersionConflict { .. } | Self::Io { .. }
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for FunnelError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            return Self::StorageFull {
                needed: 0,
                quota: 0,
            };
        }
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for FunnelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for FunnelError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<version_migrate::MigrationError> for FunnelError {
    fn from(err: version_migrate::MigrationError) -> Self {
        use version_migrate::MigrationError;

        match err {
            MigrationError::EntityNotFound(id) => Self::not_found("entity", id),
            MigrationError::DeserializationError(_) | MigrationError::SerializationError(_) => {
                Self::Serialization {
                    format: "migration".to_string(),
                    message: err.to_string(),
                }
            }
            MigrationError::IoError { .. } => Self::Io {
                message: err.to_string(),
            },
            _ => Self::Migration(err.to_string()),
        }
    }
}

/// Conversion from anyhow::Error, used at the bootstrap edge.
impl From<anyhow::Error> for FunnelError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, FunnelError>`.
pub type Result<T> = std::result::Result<T, FunnelError>;
