// Library interface for hrzones
// The CLI and integration tests both build on these modules

pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod models;
pub mod report;
pub mod series;
pub mod store;
pub mod sync;
pub mod zones;

// Re-export commonly used types for convenience
pub use batch::{ActivityRef, BatchConfig, BatchSummary, RetryPolicy, ZoneProcessor};
pub use config::AppConfig;
pub use error::{ActivityError, HrZonesError, Result, StoreError, SyncError};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use models::{Activity, ActivityId, ActivityType, Band, ZoneTotals};
pub use report::{CalendarEvent, Reporter, VolumeReport};
pub use series::{RawActivityDetail, SampleSeries};
pub use sync::{ActivitySource, ExportDirSource, SyncJob, SyncReport};
pub use zones::{SportClassifier, UnclassifiedMode, ZoneAccumulator, ZoneTable};
