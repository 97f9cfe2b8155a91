//! Date-range aggregation over stored activities and their zone totals
//!
//! Nothing here recomputes zones; it folds what the zone pipeline persisted.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Activity, ActivityId, ZoneTotals};
use crate::store::ActivityMetadataReader;

/// Training volume over a set of activities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeReport {
    pub total_activities: usize,
    /// Kilometers, rounded to 2 decimals
    pub total_distance_km: Decimal,
    pub total_duration_seconds: u64,
    /// `"H h M min"`
    pub total_duration: String,
    /// Meters
    pub total_elevation_gain: Decimal,
}

impl Default for VolumeReport {
    fn default() -> Self {
        Self {
            total_activities: 0,
            total_distance_km: Decimal::ZERO,
            total_duration_seconds: 0,
            total_duration: format_duration(0),
            total_elevation_gain: Decimal::ZERO,
        }
    }
}

/// Calendar entry for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: ActivityId,
    pub title: String,
    /// Local start date, `YYYY-MM-DD`
    pub start: String,
    pub distance: Option<Decimal>,
    pub duration_min: u64,
}

/// Band-wise sum of stored zone totals. Activities without totals count as zero.
pub fn zone_report(activities: &[Activity]) -> ZoneTotals {
    activities
        .iter()
        .filter_map(|a| a.time_in_hr_zone.as_ref())
        .fold(ZoneTotals::default(), |mut acc, totals| {
            acc.add(totals);
            acc
        })
}

/// Sum counts, distance, duration and elevation gain.
///
/// Each activity's values are truncated to whole units before summing.
/// Missing values count as zero.
pub fn volume_report(activities: &[Activity]) -> VolumeReport {
    let mut distance_m = Decimal::ZERO;
    let mut duration_s = Decimal::ZERO;
    let mut elevation_m = Decimal::ZERO;

    for activity in activities {
        distance_m += activity.distance.unwrap_or_default().trunc();
        duration_s += activity.duration.unwrap_or_default().trunc();
        elevation_m += activity.elevation_gain.unwrap_or_default().trunc();
    }

    let total_duration_seconds = duration_s.to_u64().unwrap_or(0);

    VolumeReport {
        total_activities: activities.len(),
        total_distance_km: (distance_m / Decimal::from(1000)).round_dp(2),
        total_duration_seconds,
        total_duration: format_duration(total_duration_seconds),
        total_elevation_gain: elevation_m,
    }
}

/// Render seconds as `"H h M min"`, truncating leftover seconds
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{} h {} min", hours, minutes)
}

/// Calendar entries in store order
pub fn calendar_events(activities: &[Activity]) -> Vec<CalendarEvent> {
    activities
        .iter()
        .map(|a| CalendarEvent {
            id: a.activity_id,
            title: capitalize(a.type_key()),
            start: a.start_date().to_string(),
            distance: a.distance,
            duration_min: a
                .duration
                .map(|d| (d / Decimal::from(60)).trunc().to_u64().unwrap_or(0))
                .unwrap_or(0),
        })
        .collect()
}

/// First character upper-cased, the rest lower-cased
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Answers range queries against an activity metadata store
pub struct Reporter<R> {
    reader: R,
}

impl<R: ActivityMetadataReader> Reporter<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Zone totals summed over `[start, end]`
    pub fn zones_between(&self, start: &str, end: &str) -> Result<ZoneTotals, StoreError> {
        let activities = self.reader.query_by_date_range(start, end)?;
        debug!(start, end, matched = activities.len(), "Zone report");
        Ok(zone_report(&activities))
    }

    /// Training volume over `[start, end]`
    pub fn volume_between(&self, start: &str, end: &str) -> Result<VolumeReport, StoreError> {
        let activities = self.reader.query_by_date_range(start, end)?;
        debug!(start, end, matched = activities.len(), "Volume report");
        Ok(volume_report(&activities))
    }

    /// Calendar entries for every stored activity
    pub fn calendar(&self) -> Result<Vec<CalendarEvent>, StoreError> {
        Ok(calendar_events(&self.reader.all_activities()?))
    }
}
