use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform activity identifier, shared by the metadata and detail stores
pub type ActivityId = i64;

/// Sport type as reported by the fitness platform
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityType {
    /// Sport key, e.g. "running" or "indoor_cycling"
    pub type_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_type_id: Option<i64>,
}

impl ActivityType {
    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            type_id: None,
            parent_type_id: None,
        }
    }
}

/// Activity metadata record as persisted in the metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Unique identifier, stable across both stores
    #[serde(rename = "activity_id")]
    pub activity_id: ActivityId,

    /// Local start time, `YYYY-MM-DD HH:MM:SS`
    pub start_time_local: String,

    pub activity_type: ActivityType,

    /// Distance in meters
    #[serde(default)]
    pub distance: Option<Decimal>,

    /// Elapsed duration in seconds, pauses included
    #[serde(default)]
    pub elapsed_duration: Option<Decimal>,

    /// Moving duration in seconds
    #[serde(default)]
    pub duration: Option<Decimal>,

    #[serde(default)]
    pub elevation_gain: Option<Decimal>,

    #[serde(default)]
    pub elevation_loss: Option<Decimal>,

    /// Average speed in meters per second
    #[serde(default)]
    pub average_speed: Option<Decimal>,

    #[serde(default, rename = "averageHR")]
    pub average_hr: Option<Decimal>,

    #[serde(default, rename = "maxHR")]
    pub max_hr: Option<Decimal>,

    #[serde(default)]
    pub aerobic_training_effect: Option<Decimal>,

    #[serde(default)]
    pub anaerobic_training_effect: Option<Decimal>,

    /// Heart rate time-in-zone, present once computed
    #[serde(default, rename = "time_in_hr_zone", skip_serializing_if = "Option::is_none")]
    pub time_in_hr_zone: Option<ZoneTotals>,
}

impl Activity {
    /// Create a bare activity with no measurements
    pub fn new(
        activity_id: ActivityId,
        start_time_local: impl Into<String>,
        type_key: impl Into<String>,
    ) -> Self {
        Self {
            activity_id,
            start_time_local: start_time_local.into(),
            activity_type: ActivityType::new(type_key),
            distance: None,
            elapsed_duration: None,
            duration: None,
            elevation_gain: None,
            elevation_loss: None,
            average_speed: None,
            average_hr: None,
            max_hr: None,
            aerobic_training_effect: None,
            anaerobic_training_effect: None,
            time_in_hr_zone: None,
        }
    }

    pub fn type_key(&self) -> &str {
        &self.activity_type.type_key
    }

    /// Date part of the local start timestamp
    pub fn start_date(&self) -> &str {
        self.start_time_local
            .split(' ')
            .next()
            .unwrap_or(&self.start_time_local)
    }

    /// Whether the platform recorded heart rate for this activity
    pub fn has_heart_rate(&self) -> bool {
        self.average_hr.is_some()
    }
}

/// Heart rate intensity band, z0 (lowest) to z5 (highest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Z0,
    Z1,
    Z2,
    Z3,
    Z4,
    Z5,
}

impl Band {
    /// All bands in ascending intensity order
    pub const ALL: [Band; 6] = [Band::Z0, Band::Z1, Band::Z2, Band::Z3, Band::Z4, Band::Z5];

    pub fn label(&self) -> &'static str {
        match self {
            Band::Z0 => "z0",
            Band::Z1 => "z1",
            Band::Z2 => "z2",
            Band::Z3 => "z3",
            Band::Z4 => "z4",
            Band::Z5 => "z5",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-activity heart rate time-in-zone.
///
/// Band fields hold seconds. `unclassified` holds either a count of intervals
/// without any heart rate reading or their seconds, depending on the
/// accumulator's `UnclassifiedMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZoneTotals {
    #[serde(default)]
    pub z0: u64,
    #[serde(default)]
    pub z1: u64,
    #[serde(default)]
    pub z2: u64,
    #[serde(default)]
    pub z3: u64,
    #[serde(default)]
    pub z4: u64,
    #[serde(default)]
    pub z5: u64,
    #[serde(default, rename = "NoValue")]
    pub unclassified: u64,
}

impl ZoneTotals {
    pub fn get(&self, band: Band) -> u64 {
        match band {
            Band::Z0 => self.z0,
            Band::Z1 => self.z1,
            Band::Z2 => self.z2,
            Band::Z3 => self.z3,
            Band::Z4 => self.z4,
            Band::Z5 => self.z5,
        }
    }

    fn slot_mut(&mut self, band: Band) -> &mut u64 {
        match band {
            Band::Z0 => &mut self.z0,
            Band::Z1 => &mut self.z1,
            Band::Z2 => &mut self.z2,
            Band::Z3 => &mut self.z3,
            Band::Z4 => &mut self.z4,
            Band::Z5 => &mut self.z5,
        }
    }

    pub fn set(&mut self, band: Band, seconds: u64) {
        *self.slot_mut(band) = seconds;
    }

    /// Seconds across all six bands, unclassified excluded
    pub fn classified_seconds(&self) -> u64 {
        Band::ALL.iter().map(|b| self.get(*b)).sum()
    }

    /// Band-wise sum of another set of totals into this one
    pub fn add(&mut self, other: &ZoneTotals) {
        for band in Band::ALL {
            let slot = self.slot_mut(band);
            *slot = slot.saturating_add(other.get(band));
        }
        self.unclassified = self.unclassified.saturating_add(other.unclassified);
    }

    /// (label, value) pairs in band order followed by the unclassified bucket
    pub fn entries(&self) -> Vec<(&'static str, u64)> {
        let mut entries: Vec<(&'static str, u64)> =
            Band::ALL.iter().map(|b| (b.label(), self.get(*b))).collect();
        entries.push(("NoValue", self.unclassified));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_zone_totals_serialization_keys() {
        let totals = ZoneTotals {
            z0: 1,
            z1: 2,
            z2: 3,
            z3: 4,
            z4: 5,
            z5: 6,
            unclassified: 7,
        };
        let json = serde_json::to_string(&totals).unwrap();
        assert!(json.contains("\"z3\":4"));
        assert!(json.contains("\"NoValue\":7"));

        let back: ZoneTotals = serde_json::from_str(&json).unwrap();
        assert_eq!(back, totals);
    }

    #[test]
    fn test_zone_totals_partial_document() {
        // Older documents may lack z0 and NoValue
        let totals: ZoneTotals =
            serde_json::from_str(r#"{"z1": 10, "z2": 20, "z3": 0, "z4": 0, "z5": 5}"#).unwrap();
        assert_eq!(totals.z0, 0);
        assert_eq!(totals.unclassified, 0);
        assert_eq!(totals.classified_seconds(), 35);
    }

    #[test]
    fn test_zone_totals_add() {
        let mut a = ZoneTotals {
            z1: 10,
            unclassified: 1,
            ..Default::default()
        };
        let b = ZoneTotals {
            z1: 5,
            z5: 3,
            unclassified: 2,
            ..Default::default()
        };
        a.add(&b);
        assert_eq!(a.z1, 15);
        assert_eq!(a.z5, 3);
        assert_eq!(a.unclassified, 3);
    }

    #[test]
    fn test_activity_platform_field_names() {
        let json = r#"{
            "activity_id": 21453616324,
            "startTimeLocal": "2025-11-02 09:15:00",
            "activityType": {"typeKey": "running", "typeId": 1},
            "distance": 10012.5,
            "duration": 3000.25,
            "elevationGain": null,
            "averageHR": 151.0
        }"#;
        let activity: Activity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.activity_id, 21453616324);
        assert_eq!(activity.type_key(), "running");
        assert_eq!(activity.start_date(), "2025-11-02");
        assert_eq!(activity.distance, Some(dec!(10012.5)));
        assert!(activity.elevation_gain.is_none());
        assert!(activity.has_heart_rate());
        assert!(activity.time_in_hr_zone.is_none());
    }

    #[test]
    fn test_band_order() {
        assert!(Band::Z0 < Band::Z5);
        assert_eq!(Band::Z3.index(), 3);
        assert_eq!(Band::Z4.to_string(), "z4");
    }
}
