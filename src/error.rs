//! Unified error hierarchy for hrzones
//!
//! Per-activity failures are kept separate from store and sync failures so the
//! batch boundary can attribute every error to a single activity and carry on
//! with the rest of the batch.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::ActivityId;

/// Top-level error type for hrzones operations
#[derive(Debug, Error)]
pub enum HrZonesError {
    /// Failure confined to a single activity
    #[error("Activity error: {0}")]
    Activity(#[from] ActivityError),

    /// Metadata or detail store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Ingestion/sync errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors scoped to one activity. None of these abort a batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActivityError {
    /// A required metric descriptor is absent from the raw detail
    #[error("activity {activity_id}: metric '{key}' not found in descriptors")]
    MetricNotFound { activity_id: ActivityId, key: String },

    /// Negative time delta, malformed row, or a value of the wrong type
    #[error("activity {activity_id}: integrity violation at sample {sample} (elapsed={elapsed}): {reason}")]
    Integrity {
        activity_id: ActivityId,
        sample: usize,
        elapsed: String,
        reason: String,
    },

    /// No raw detail exists for the activity
    #[error("activity {activity_id}: raw detail not found")]
    NotFound { activity_id: ActivityId },

    /// Persisting zone totals failed
    #[error("activity {activity_id}: write failed: {reason}")]
    WriteFailed { activity_id: ActivityId, reason: String },
}

impl ActivityError {
    /// Activity the error is attributed to
    pub fn activity_id(&self) -> ActivityId {
        match self {
            ActivityError::MetricNotFound { activity_id, .. }
            | ActivityError::Integrity { activity_id, .. }
            | ActivityError::NotFound { activity_id }
            | ActivityError::WriteFailed { activity_id, .. } => *activity_id,
        }
    }

    /// Short machine-readable kind, used in reports and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityError::MetricNotFound { .. } => "metric_not_found",
            ActivityError::Integrity { .. } => "integrity",
            ActivityError::NotFound { .. } => "not_found",
            ActivityError::WriteFailed { .. } => "write_failed",
        }
    }

    /// Only write failures are transient
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActivityError::WriteFailed { .. })
    }
}

/// Metadata and detail store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid stored value in {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Ingestion job errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// Metadata and detail stores disagree on the activity id set
    #[error(
        "metadata and detail stores must hold identical ids: {} only in metadata {:?}, {} only in detail {:?}",
        only_in_metadata.len(),
        only_in_metadata,
        only_in_detail.len(),
        only_in_detail
    )]
    StoreMismatch {
        only_in_metadata: Vec<ActivityId>,
        only_in_detail: Vec<ActivityId>,
    },

    /// The remote activity source failed
    #[error("activity source error: {0}")]
    Source(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Activity(#[from] ActivityError),
}

/// Result type alias for hrzones operations
pub type Result<T> = std::result::Result<T, HrZonesError>;

impl HrZonesError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            HrZonesError::Activity(err) => err.is_retryable(),
            HrZonesError::Store(StoreError::Sqlite(_)) | HrZonesError::Io(_) => true,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            HrZonesError::Activity(ActivityError::NotFound { .. }) => ErrorSeverity::Warning,
            HrZonesError::Activity(_) => ErrorSeverity::Error,
            HrZonesError::Sync(SyncError::StoreMismatch { .. }) => ErrorSeverity::Critical,
            HrZonesError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Data integrity is compromised, requires attention
    Critical,
    /// Error that prevents an operation but the system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}
