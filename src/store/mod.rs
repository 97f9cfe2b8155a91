//! Store interfaces consumed by the zone pipeline, with SQLite, filesystem,
//! and in-memory implementations.

pub mod blob;
pub mod database;
pub mod memory;

use crate::error::{ActivityError, StoreError};
use crate::models::{Activity, ActivityId, ZoneTotals};
use crate::series::RawActivityDetail;

pub use blob::DetailStore;
pub use database::ActivityDatabase;
pub use memory::{MemoryActivityStore, MemoryDetailStore};

/// Read access to per-activity raw sample detail
pub trait RawDetailReader: Send + Sync {
    /// Fetch the raw detail of one activity, `NotFound` if absent
    fn fetch(&self, activity_id: ActivityId) -> Result<RawActivityDetail, ActivityError>;

    /// Ids of every activity with stored detail
    fn list_ids(&self) -> Result<Vec<ActivityId>, StoreError>;
}

/// Write access for raw detail, used by ingestion
pub trait RawDetailWriter: Send + Sync {
    fn put(&self, activity_id: ActivityId, detail: &RawActivityDetail) -> Result<(), StoreError>;
}

/// Persists computed zone totals. Writes overwrite earlier totals.
pub trait TotalsWriter: Send + Sync {
    fn write_zone_totals(&self, activity_id: ActivityId, totals: &ZoneTotals) -> Result<(), ActivityError>;
}

/// Read access to activity metadata
pub trait ActivityMetadataReader: Send + Sync {
    /// Activities whose local start timestamp lies in `[start, end]`,
    /// compared as strings
    fn query_by_date_range(&self, start: &str, end: &str) -> Result<Vec<Activity>, StoreError>;

    /// Full scan
    fn all_activities(&self) -> Result<Vec<Activity>, StoreError>;

    /// Ids of every stored activity
    fn activity_ids(&self) -> Result<Vec<ActivityId>, StoreError> {
        Ok(self.all_activities()?.iter().map(|a| a.activity_id).collect())
    }
}

/// Write access to activity metadata, used by ingestion
pub trait ActivityMetadataWriter: Send + Sync {
    /// Insert or replace activities. Existing zone totals are kept.
    fn put_activities(&self, activities: &[Activity]) -> Result<(), StoreError>;
}

// Borrowed stores, so one database can back several pipeline stages

impl<T: RawDetailReader + ?Sized> RawDetailReader for &T {
    fn fetch(&self, activity_id: ActivityId) -> Result<RawActivityDetail, ActivityError> {
        (**self).fetch(activity_id)
    }

    fn list_ids(&self) -> Result<Vec<ActivityId>, StoreError> {
        (**self).list_ids()
    }
}

impl<T: RawDetailWriter + ?Sized> RawDetailWriter for &T {
    fn put(&self, activity_id: ActivityId, detail: &RawActivityDetail) -> Result<(), StoreError> {
        (**self).put(activity_id, detail)
    }
}

impl<T: TotalsWriter + ?Sized> TotalsWriter for &T {
    fn write_zone_totals(&self, activity_id: ActivityId, totals: &ZoneTotals) -> Result<(), ActivityError> {
        (**self).write_zone_totals(activity_id, totals)
    }
}

impl<T: ActivityMetadataReader + ?Sized> ActivityMetadataReader for &T {
    fn query_by_date_range(&self, start: &str, end: &str) -> Result<Vec<Activity>, StoreError> {
        (**self).query_by_date_range(start, end)
    }

    fn all_activities(&self) -> Result<Vec<Activity>, StoreError> {
        (**self).all_activities()
    }

    fn activity_ids(&self) -> Result<Vec<ActivityId>, StoreError> {
        (**self).activity_ids()
    }
}

impl<T: ActivityMetadataWriter + ?Sized> ActivityMetadataWriter for &T {
    fn put_activities(&self, activities: &[Activity]) -> Result<(), StoreError> {
        (**self).put_activities(activities)
    }
}

/// Inclusive string range test on a local start timestamp
pub(crate) fn in_range(start_time_local: &str, start: &str, end: &str) -> bool {
    start_time_local >= start && start_time_local <= end
}
