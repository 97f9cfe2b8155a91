//! In-memory stores, used by tests and dry runs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{in_range, ActivityMetadataReader, ActivityMetadataWriter, RawDetailReader, RawDetailWriter, TotalsWriter};
use crate::error::{ActivityError, StoreError};
use crate::models::{Activity, ActivityId, ZoneTotals};
use crate::series::RawActivityDetail;

/// Activity metadata kept in a map keyed by id
#[derive(Debug, Clone, Default)]
pub struct MemoryActivityStore {
    activities: Arc<Mutex<BTreeMap<ActivityId, Activity>>>,
    fail_writes: Arc<Mutex<u32>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activities(activities: impl IntoIterator<Item = Activity>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.activities.lock() {
            for activity in activities {
                map.insert(activity.activity_id, activity);
            }
        }
        store
    }

    /// Make the next `count` zone total writes fail
    pub fn fail_next_writes(&self, count: u32) {
        if let Ok(mut remaining) = self.fail_writes.lock() {
            *remaining = count;
        }
    }

    pub fn get(&self, activity_id: ActivityId) -> Option<Activity> {
        self.lock().ok().and_then(|map| map.get(&activity_id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<ActivityId, Activity>>, StoreError> {
        self.activities.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl ActivityMetadataReader for MemoryActivityStore {
    fn query_by_date_range(&self, start: &str, end: &str) -> Result<Vec<Activity>, StoreError> {
        Ok(self
            .lock()?
            .values()
            .filter(|a| in_range(&a.start_time_local, start, end))
            .cloned()
            .collect())
    }

    fn all_activities(&self) -> Result<Vec<Activity>, StoreError> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

impl ActivityMetadataWriter for MemoryActivityStore {
    fn put_activities(&self, activities: &[Activity]) -> Result<(), StoreError> {
        let mut map = self.lock()?;
        for activity in activities {
            let mut activity = activity.clone();
            if let Some(existing) = map.get(&activity.activity_id) {
                activity.time_in_hr_zone = activity.time_in_hr_zone.or(existing.time_in_hr_zone);
            }
            map.insert(activity.activity_id, activity);
        }
        Ok(())
    }
}

impl TotalsWriter for MemoryActivityStore {
    fn write_zone_totals(&self, activity_id: ActivityId, totals: &ZoneTotals) -> Result<(), ActivityError> {
        let write_failed = |reason: &str| ActivityError::WriteFailed {
            activity_id,
            reason: reason.to_string(),
        };

        {
            let mut remaining = self.fail_writes.lock().map_err(|_| write_failed("lock poisoned"))?;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(write_failed("injected failure"));
            }
        }

        let mut map = self.activities.lock().map_err(|_| write_failed("lock poisoned"))?;
        let activity = map
            .get_mut(&activity_id)
            .ok_or_else(|| write_failed("no metadata record for activity"))?;
        activity.time_in_hr_zone = Some(*totals);
        Ok(())
    }
}

/// Raw detail documents kept in a map keyed by id
#[derive(Debug, Clone, Default)]
pub struct MemoryDetailStore {
    details: Arc<Mutex<BTreeMap<ActivityId, RawActivityDetail>>>,
}

impl MemoryDetailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, activity_id: ActivityId, detail: RawActivityDetail) {
        if let Ok(mut map) = self.details.lock() {
            map.insert(activity_id, detail);
        }
    }
}

impl RawDetailReader for MemoryDetailStore {
    fn fetch(&self, activity_id: ActivityId) -> Result<RawActivityDetail, ActivityError> {
        self.details
            .lock()
            .ok()
            .and_then(|map| map.get(&activity_id).cloned())
            .ok_or(ActivityError::NotFound { activity_id })
    }

    fn list_ids(&self) -> Result<Vec<ActivityId>, StoreError> {
        let map = self.details.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(map.keys().copied().collect())
    }
}

impl RawDetailWriter for MemoryDetailStore {
    fn put(&self, activity_id: ActivityId, detail: &RawActivityDetail) -> Result<(), StoreError> {
        self.details
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(activity_id, detail.clone());
        Ok(())
    }
}
