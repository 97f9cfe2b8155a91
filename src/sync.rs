//! Ingestion of new platform activities into the metadata and detail stores
//!
//! Before anything is copied, both stores must agree on the stored id set.
//! A disagreement is reported and the job stops; nothing is repaired.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ActivityError, SyncError};
use crate::models::{Activity, ActivityId, ActivityType};
use crate::series::RawActivityDetail;
use crate::store::{ActivityMetadataReader, ActivityMetadataWriter, RawDetailReader, RawDetailWriter};

/// Metadata writes are grouped in chunks of this size
pub const DEFAULT_CHUNK_SIZE: usize = 25;

/// Activity summary as listed by the platform
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceActivity {
    pub activity_id: ActivityId,
    pub start_time_local: String,
    pub activity_type: ActivityType,
    #[serde(default)]
    pub distance: Option<Value>,
    #[serde(default)]
    pub elapsed_duration: Option<Value>,
    #[serde(default)]
    pub duration: Option<Value>,
    #[serde(default)]
    pub elevation_gain: Option<Value>,
    #[serde(default)]
    pub elevation_loss: Option<Value>,
    #[serde(default)]
    pub average_speed: Option<Value>,
    #[serde(default, rename = "averageHR")]
    pub average_hr: Option<Value>,
    #[serde(default, rename = "maxHR")]
    pub max_hr: Option<Value>,
    #[serde(default)]
    pub aerobic_training_effect: Option<Value>,
    #[serde(default)]
    pub anaerobic_training_effect: Option<Value>,
}

impl SourceActivity {
    /// Convert to a stored record, quantizing every measurement to 3 decimals
    pub fn to_activity(&self) -> Activity {
        let id = self.activity_id;
        let q = |field: &str, value: &Option<Value>| quantize(id, field, value.as_ref());

        Activity {
            activity_id: id,
            start_time_local: self.start_time_local.clone(),
            activity_type: self.activity_type.clone(),
            distance: q("distance", &self.distance),
            elapsed_duration: q("elapsedDuration", &self.elapsed_duration),
            duration: q("duration", &self.duration),
            elevation_gain: q("elevationGain", &self.elevation_gain),
            elevation_loss: q("elevationLoss", &self.elevation_loss),
            average_speed: q("averageSpeed", &self.average_speed),
            average_hr: q("averageHR", &self.average_hr),
            max_hr: q("maxHR", &self.max_hr),
            aerobic_training_effect: q("aerobicTrainingEffect", &self.aerobic_training_effect),
            anaerobic_training_effect: q("anaerobicTrainingEffect", &self.anaerobic_training_effect),
            time_in_hr_zone: None,
        }
    }
}

/// Numeric (or numeric string) value to a 3-decimal `Decimal`, banker's rounding.
/// Anything else becomes `None` with a warning.
fn quantize(activity_id: ActivityId, field: &str, value: Option<&Value>) -> Option<Decimal> {
    let parsed = match value? {
        Value::Null => return None,
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    };

    match parsed {
        Some(d) => Some(d.round_dp(3)),
        None => {
            warn!(activity_id, field, value = %value.map(|v| v.to_string()).unwrap_or_default(), "Unconvertible value dropped");
            None
        }
    }
}

/// Remote side of the sync: the fitness platform or an export of it
pub trait ActivitySource {
    fn list_activities(&self) -> Result<Vec<SourceActivity>, SyncError>;
    fn fetch_detail(&self, activity_id: ActivityId) -> Result<RawActivityDetail, SyncError>;
}

/// Platform export on disk: `activities.json` plus `details/<id>.json`
#[derive(Debug, Clone)]
pub struct ExportDirSource {
    root: PathBuf,
}

impl ExportDirSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, SyncError> {
        fs::read(path).map_err(|e| SyncError::Source(format!("{}: {}", path.display(), e)))
    }
}

impl ActivitySource for ExportDirSource {
    fn list_activities(&self) -> Result<Vec<SourceActivity>, SyncError> {
        let path = self.root.join("activities.json");
        let bytes = self.read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| SyncError::Source(format!("{}: {}", path.display(), e)))
    }

    fn fetch_detail(&self, activity_id: ActivityId) -> Result<RawActivityDetail, SyncError> {
        let path = self.root.join("details").join(format!("{}.json", activity_id));
        if !path.is_file() {
            return Err(ActivityError::NotFound { activity_id }.into());
        }
        let bytes = self.read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| SyncError::Source(format!("{}: {}", path.display(), e)))
    }
}

/// Outcome of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Activities listed by the source
    pub remote: usize,
    /// Of those, already in the stores
    pub already_stored: usize,
    /// Ids newly written to both stores
    pub added: Vec<ActivityId>,
    /// Listed ids left out because the source has no detail for them
    pub skipped: Vec<ActivityId>,
    /// Detail objects written
    pub detail_written: usize,
}

/// Verify both stores hold the same ids; returns the sorted id list
pub fn check_store_integrity<M, D>(metadata: &M, details: &D) -> Result<Vec<ActivityId>, SyncError>
where
    M: ActivityMetadataReader + ?Sized,
    D: RawDetailReader + ?Sized,
{
    let metadata_ids: BTreeSet<ActivityId> = metadata.activity_ids()?.into_iter().collect();
    let detail_ids: BTreeSet<ActivityId> = details.list_ids()?.into_iter().collect();

    if metadata_ids != detail_ids {
        return Err(SyncError::StoreMismatch {
            only_in_metadata: metadata_ids.difference(&detail_ids).copied().collect(),
            only_in_detail: detail_ids.difference(&metadata_ids).copied().collect(),
        });
    }

    debug!(count = metadata_ids.len(), "Store id sets match");
    Ok(metadata_ids.into_iter().collect())
}

/// Copies activities missing from the stores out of an `ActivitySource`
pub struct SyncJob<S, M, D> {
    source: S,
    metadata: M,
    details: D,
    chunk_size: usize,
}

impl<S, M, D> SyncJob<S, M, D>
where
    S: ActivitySource,
    M: ActivityMetadataReader + ActivityMetadataWriter,
    D: RawDetailReader + RawDetailWriter,
{
    pub fn new(source: S, metadata: M, details: D) -> Self {
        Self {
            source,
            metadata,
            details,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn run(&self) -> Result<SyncReport, SyncError> {
        let stored: BTreeSet<ActivityId> = check_store_integrity(&self.metadata, &self.details)?
            .into_iter()
            .collect();

        let remote = self.source.list_activities()?;
        info!("Source lists {} activities", remote.len());

        let mut seen = BTreeSet::new();
        let missing: Vec<Activity> = remote
            .iter()
            .filter(|a| !stored.contains(&a.activity_id) && seen.insert(a.activity_id))
            .map(SourceActivity::to_activity)
            .collect();
        info!("{} activities to add", missing.len());

        let mut added = Vec::with_capacity(missing.len());
        let mut skipped = Vec::new();

        for chunk in missing.chunks(self.chunk_size) {
            // Nothing is written for an activity until its detail is in hand
            let mut fetched = Vec::with_capacity(chunk.len());
            for activity in chunk {
                match self.source.fetch_detail(activity.activity_id) {
                    Ok(detail) => fetched.push((activity.clone(), detail)),
                    Err(SyncError::Activity(ActivityError::NotFound { activity_id })) => {
                        warn!(activity_id, "No detail at source, activity skipped");
                        skipped.push(activity_id);
                    }
                    Err(e) => return Err(e),
                }
            }

            let activities: Vec<Activity> = fetched.iter().map(|(a, _)| a.clone()).collect();
            self.metadata.put_activities(&activities)?;
            for (activity, detail) in &fetched {
                self.details.put(activity.activity_id, detail)?;
                added.push(activity.activity_id);
            }
            debug!(written = fetched.len(), "Chunk written");
        }
        info!("{} activities added, {} skipped", added.len(), skipped.len());

        Ok(SyncReport {
            remote: remote.len(),
            already_stored: remote.iter().filter(|a| stored.contains(&a.activity_id)).count(),
            detail_written: added.len(),
            added,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryActivityStore, MemoryDetailStore};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;

    struct FakeSource {
        activities: Vec<SourceActivity>,
        details: HashMap<ActivityId, RawActivityDetail>,
    }

    impl ActivitySource for FakeSource {
        fn list_activities(&self) -> Result<Vec<SourceActivity>, SyncError> {
            Ok(self.activities.clone())
        }

        fn fetch_detail(&self, activity_id: ActivityId) -> Result<RawActivityDetail, SyncError> {
            self.details
                .get(&activity_id)
                .cloned()
                .ok_or_else(|| ActivityError::NotFound { activity_id }.into())
        }
    }

    fn source_activity(id: ActivityId) -> SourceActivity {
        serde_json::from_value(json!({
            "activityId": id,
            "startTimeLocal": "2025-08-01 06:30:00",
            "activityType": {"typeKey": "running"},
            "distance": 8012.34567,
            "duration": "2400.0004",
            "averageHR": 140,
            "maxHR": null,
            "elevationGain": "n/a"
        }))
        .unwrap()
    }

    fn fake_source(ids: &[ActivityId]) -> FakeSource {
        FakeSource {
            activities: ids.iter().map(|id| source_activity(*id)).collect(),
            details: ids.iter().map(|id| (*id, RawActivityDetail::default())).collect(),
        }
    }

    #[test]
    fn test_quantize_values() {
        let activity = source_activity(1).to_activity();
        assert_eq!(activity.distance, Some(dec!(8012.346)));
        assert_eq!(activity.duration, Some(dec!(2400.000)));
        assert_eq!(activity.average_hr, Some(dec!(140)));
        assert_eq!(activity.max_hr, None);
        assert_eq!(activity.elevation_gain, None);
    }

    #[test]
    fn test_sync_copies_missing_activities() {
        let metadata = MemoryActivityStore::with_activities([source_activity(1).to_activity()]);
        let details = MemoryDetailStore::new();
        details.insert(1, RawActivityDetail::default());

        let job = SyncJob::new(fake_source(&[1, 2, 3]), metadata.clone(), details.clone()).with_chunk_size(1);
        let report = job.run().unwrap();

        assert_eq!(report.remote, 3);
        assert_eq!(report.already_stored, 1);
        assert_eq!(report.added, vec![2, 3]);
        assert_eq!(report.detail_written, 2);
        assert_eq!(metadata.activity_ids().unwrap(), vec![1, 2, 3]);
        assert_eq!(details.list_ids().unwrap(), vec![1, 2, 3]);

        // Second run has nothing to do
        let job = SyncJob::new(fake_source(&[1, 2, 3]), metadata, details);
        assert!(job.run().unwrap().added.is_empty());
    }

    #[test]
    fn test_mismatched_stores_fail_loudly() {
        let metadata = MemoryActivityStore::with_activities([source_activity(1).to_activity()]);
        let details = MemoryDetailStore::new();
        details.insert(5, RawActivityDetail::default());

        let job = SyncJob::new(fake_source(&[1, 2]), metadata.clone(), details.clone());
        match job.run().unwrap_err() {
            SyncError::StoreMismatch {
                only_in_metadata,
                only_in_detail,
            } => {
                assert_eq!(only_in_metadata, vec![1]);
                assert_eq!(only_in_detail, vec![5]);
            }
            other => panic!("expected store mismatch, got {other:?}"),
        }

        // Nothing was repaired
        assert_eq!(metadata.activity_ids().unwrap(), vec![1]);
        assert_eq!(details.list_ids().unwrap(), vec![5]);
    }

    #[test]
    fn test_activity_without_source_detail_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("details")).unwrap();
        fs::write(
            dir.path().join("activities.json"),
            json!([
                {"activityId": 1, "startTimeLocal": "2025-08-01 06:30:00", "activityType": {"typeKey": "running"}},
                {"activityId": 2, "startTimeLocal": "2025-08-02 06:30:00", "activityType": {"typeKey": "running"}},
                {"activityId": 3, "startTimeLocal": "2025-08-03 06:30:00", "activityType": {"typeKey": "running"}}
            ])
            .to_string(),
        )
        .unwrap();
        for id in [1, 3] {
            fs::write(
                dir.path().join("details").join(format!("{}.json", id)),
                r#"{"metricDescriptors": [], "activityDetailMetrics": []}"#,
            )
            .unwrap();
        }

        let metadata = MemoryActivityStore::new();
        let details = MemoryDetailStore::new();
        let report = SyncJob::new(ExportDirSource::new(dir.path()), metadata.clone(), details.clone())
            .with_chunk_size(2)
            .run()
            .unwrap();

        assert_eq!(report.added, vec![1, 3]);
        assert_eq!(report.skipped, vec![2]);
        assert_eq!(report.detail_written, 2);
        assert_eq!(metadata.activity_ids().unwrap(), vec![1, 3]);
        assert_eq!(details.list_ids().unwrap(), vec![1, 3]);

        // Stores still agree, so the next run goes through and picks up 2 once it appears
        fs::write(
            dir.path().join("details").join("2.json"),
            r#"{"metricDescriptors": [], "activityDetailMetrics": []}"#,
        )
        .unwrap();
        let again = SyncJob::new(ExportDirSource::new(dir.path()), metadata.clone(), details.clone())
            .run()
            .unwrap();
        assert_eq!(again.added, vec![2]);
        assert!(again.skipped.is_empty());
        assert_eq!(check_store_integrity(&metadata, &details).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_export_dir_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("details")).unwrap();
        fs::write(
            dir.path().join("activities.json"),
            json!([{
                "activityId": 77,
                "startTimeLocal": "2025-08-02 18:00:00",
                "activityType": {"typeKey": "cycling", "typeId": 2},
                "distance": 30000.0
            }])
            .to_string(),
        )
        .unwrap();
        fs::write(
            dir.path().join("details").join("77.json"),
            r#"{"metricDescriptors": [], "activityDetailMetrics": []}"#,
        )
        .unwrap();

        let source = ExportDirSource::new(dir.path());
        let listed = source.list_activities().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].activity_type.type_key, "cycling");
        assert!(source.fetch_detail(77).is_ok());
        assert!(matches!(
            source.fetch_detail(78),
            Err(SyncError::Activity(ActivityError::NotFound { activity_id: 78 }))
        ));
    }
}
