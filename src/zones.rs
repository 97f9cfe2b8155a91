use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::ActivityError;
use crate::models::{Band, ZoneTotals};
use crate::series::SampleSeries;

/// Heart rate zone thresholds for one sport category
///
/// Five ascending bpm thresholds define six half-open bands:
/// - Z0: HR <= z1
/// - Z1: z1 < HR <= z2
/// - Z2: z2 < HR <= z3
/// - Z3: z3 < HR <= z4
/// - Z4: z4 < HR <= z5
/// - Z5: HR > z5
///
/// A reading equal to a threshold falls into the band below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTable {
    pub z1: u16,
    pub z2: u16,
    pub z3: u16,
    pub z4: u16,
    pub z5: u16,
}

/// Running heart rate zones (bpm)
pub const RUNNING_ZONES: ZoneTable = ZoneTable {
    z1: 118,
    z2: 126,
    z3: 146,
    z4: 166,
    z5: 185,
};

/// Cycling heart rate zones (bpm)
pub const CYCLING_ZONES: ZoneTable = ZoneTable {
    z1: 121,
    z2: 140,
    z3: 159,
    z4: 172,
    z5: 179,
};

impl ZoneTable {
    /// Thresholds in ascending order
    pub fn thresholds(&self) -> [u16; 5] {
        [self.z1, self.z2, self.z3, self.z4, self.z5]
    }

    /// Determine which band a heart rate reading falls into
    pub fn band_for(&self, hr: f64) -> Band {
        if hr > f64::from(self.z5) {
            Band::Z5
        } else if hr > f64::from(self.z4) {
            Band::Z4
        } else if hr > f64::from(self.z3) {
            Band::Z3
        } else if hr > f64::from(self.z2) {
            Band::Z2
        } else if hr > f64::from(self.z1) {
            Band::Z1
        } else {
            Band::Z0
        }
    }
}

/// Sport categories with their own zone table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SportCategory {
    Cycling,
    Running,
}

impl SportCategory {
    pub fn zone_table(&self) -> &'static ZoneTable {
        match self {
            SportCategory::Cycling => &CYCLING_ZONES,
            SportCategory::Running => &RUNNING_ZONES,
        }
    }
}

/// Platform sport keys using cycling zones
pub const CYCLING_SPORTS: [&str; 4] = ["road_biking", "virtual_ride", "cycling", "indoor_cycling"];

/// Platform sport keys using running zones
pub const RUNNING_SPORTS: [&str; 4] = ["running", "walking", "track_running", "obstacle_run"];

/// Maps a platform sport key to the zone table used for it
pub struct SportClassifier;

impl SportClassifier {
    /// Category for a known sport key, `None` if the key is in neither list
    pub fn category(type_key: &str) -> Option<SportCategory> {
        if CYCLING_SPORTS.contains(&type_key) {
            Some(SportCategory::Cycling)
        } else if RUNNING_SPORTS.contains(&type_key) {
            Some(SportCategory::Running)
        } else {
            None
        }
    }

    /// Zone table for a sport key. Unknown keys fall back to running zones.
    pub fn classify(type_key: &str) -> &'static ZoneTable {
        match Self::category(type_key) {
            Some(category) => category.zone_table(),
            None => {
                warn!(sport = type_key, "Unknown sport key, using running heart rate zones");
                &RUNNING_ZONES
            }
        }
    }
}

/// How intervals without any heart rate reading are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnclassifiedMode {
    /// One per interval, matching totals already stored by earlier runs
    #[default]
    Count,
    /// Elapsed seconds, same unit as the bands
    Seconds,
}

impl std::str::FromStr for UnclassifiedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "count" => Ok(UnclassifiedMode::Count),
            "seconds" => Ok(UnclassifiedMode::Seconds),
            _ => Err(format!("Invalid unclassified mode: {}", s)),
        }
    }
}

/// Converts a sample series into per-band time-in-zone
#[derive(Debug, Clone, Copy)]
pub struct ZoneAccumulator<'t> {
    table: &'t ZoneTable,
    mode: UnclassifiedMode,
}

impl<'t> ZoneAccumulator<'t> {
    pub fn new(table: &'t ZoneTable, mode: UnclassifiedMode) -> Self {
        Self { table, mode }
    }

    /// Walk consecutive sample pairs and accumulate time per band.
    ///
    /// Interval (i-1, i) is classified by the heart rate at i, or at i-1 when
    /// sample i has no reading. With neither, it is unclassified.
    pub fn accumulate(&self, series: &SampleSeries<'_>) -> Result<ZoneTotals, ActivityError> {
        let mut bands = [0.0f64; 6];
        let mut unclassified = 0.0f64;

        if series.len() < 2 {
            debug!(
                activity_id = series.activity_id(),
                samples = series.len(),
                "Not enough samples for any interval"
            );
            return Ok(ZoneTotals::default());
        }

        let mut previous_elapsed = series.elapsed_at(0)?;

        for i in 1..series.len() {
            let elapsed = series.elapsed_at(i)?;
            let delta_t = elapsed - previous_elapsed;
            if delta_t < 0.0 {
                return Err(series.integrity(
                    i,
                    elapsed,
                    format!("negative time delta {} (previous elapsed {})", delta_t, previous_elapsed),
                ));
            }

            match self.interval_heart_rate(series, i, elapsed)? {
                Some(hr) => {
                    let band = self.table.band_for(hr);
                    trace!(sample = i, hr, %band, delta_t, "Interval classified");
                    bands[band.index()] += delta_t;
                }
                None => {
                    unclassified += match self.mode {
                        UnclassifiedMode::Count => 1.0,
                        UnclassifiedMode::Seconds => delta_t,
                    };
                }
            }

            previous_elapsed = elapsed;
        }

        let mut totals = ZoneTotals {
            unclassified: unclassified as u64,
            ..Default::default()
        };
        for band in Band::ALL {
            totals.set(band, bands[band.index()] as u64);
        }

        debug!(
            activity_id = series.activity_id(),
            samples = series.len(),
            classified_seconds = totals.classified_seconds(),
            unclassified = totals.unclassified,
            "Zone distribution computed"
        );

        Ok(totals)
    }

    /// Heart rate for interval ending at sample `i`, carried forward one step
    fn interval_heart_rate(
        &self,
        series: &SampleSeries<'_>,
        i: usize,
        elapsed: f64,
    ) -> Result<Option<f64>, ActivityError> {
        let read = |row: usize| {
            series.heart_rate_at(row).map_err(|_| {
                let column = series.heart_rate_column();
                let found = series
                    .raw_value(row, column)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "nothing".to_string());
                series.integrity(
                    i,
                    elapsed,
                    format!("heart rate at sample {} is not comparable: {}", row, found),
                )
            })
        };

        match read(i)? {
            Some(hr) => Ok(Some(hr)),
            None => read(i - 1),
        }
    }
}

/// Classify and accumulate one activity's series in a single call
pub fn zone_distribution(
    series: &SampleSeries<'_>,
    type_key: &str,
    mode: UnclassifiedMode,
) -> Result<ZoneTotals, ActivityError> {
    let table = SportClassifier::classify(type_key);
    ZoneAccumulator::new(table, mode).accumulate(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{RawActivityDetail, ELAPSED_TIME_KEY, HEART_RATE_KEY};
    use serde_json::{json, Value};

    fn detail(samples: &[(f64, Option<f64>)]) -> RawActivityDetail {
        RawActivityDetail::from_columns(
            &[(HEART_RATE_KEY, 0), (ELAPSED_TIME_KEY, 1)],
            samples
                .iter()
                .map(|(t, hr)| vec![hr.map_or(Value::Null, |v| json!(v)), json!(t)])
                .collect(),
        )
    }

    fn running(samples: &[(f64, Option<f64>)], mode: UnclassifiedMode) -> Result<ZoneTotals, ActivityError> {
        let detail = detail(samples);
        let series = SampleSeries::from_detail(1, &detail)?;
        ZoneAccumulator::new(&RUNNING_ZONES, mode).accumulate(&series)
    }

    #[test]
    fn test_threshold_boundaries() {
        assert_eq!(RUNNING_ZONES.band_for(127.0), Band::Z2);
        assert_eq!(RUNNING_ZONES.band_for(126.0), Band::Z1);
        assert_eq!(RUNNING_ZONES.band_for(146.0), Band::Z2);
        assert_eq!(RUNNING_ZONES.band_for(147.0), Band::Z3);
        assert_eq!(RUNNING_ZONES.band_for(118.0), Band::Z0);
        assert_eq!(RUNNING_ZONES.band_for(0.0), Band::Z0);
        assert_eq!(RUNNING_ZONES.band_for(185.0), Band::Z4);
        assert_eq!(RUNNING_ZONES.band_for(186.0), Band::Z5);
    }

    #[test]
    fn test_sport_classification() {
        assert_eq!(SportClassifier::classify("indoor_cycling"), &CYCLING_ZONES);
        assert_eq!(SportClassifier::classify("road_biking"), &CYCLING_ZONES);
        assert_eq!(SportClassifier::classify("obstacle_run"), &RUNNING_ZONES);
        assert_eq!(SportClassifier::classify("unknown_sport"), &RUNNING_ZONES);
        assert_eq!(SportClassifier::category("unknown_sport"), None);
        assert_eq!(SportClassifier::category("walking"), Some(SportCategory::Running));
    }

    #[test]
    fn test_thresholds_ascending() {
        for table in [RUNNING_ZONES, CYCLING_ZONES] {
            let t = table.thresholds();
            assert!(t.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_duration_conservation() {
        let totals = running(
            &[(0.0, Some(100.0)), (5.0, Some(130.0)), (12.0, Some(150.0)), (20.0, Some(190.0))],
            UnclassifiedMode::Count,
        )
        .unwrap();

        assert_eq!(totals.z2, 5);
        assert_eq!(totals.z3, 7);
        assert_eq!(totals.z5, 8);
        assert_eq!(totals.unclassified, 0);
        assert_eq!(totals.classified_seconds(), 20);
    }

    #[test]
    fn test_single_missing_sample_carries_forward() {
        let totals = running(
            &[(0.0, Some(150.0)), (4.0, None), (6.0, Some(100.0))],
            UnclassifiedMode::Count,
        )
        .unwrap();

        // (0,1) uses 150 from sample 0, (1,2) uses 100
        assert_eq!(totals.z3, 4);
        assert_eq!(totals.z0, 2);
        assert_eq!(totals.unclassified, 0);
    }

    #[test]
    fn test_carry_forward_is_one_step_only() {
        let totals = running(
            &[(0.0, Some(150.0)), (1.0, None), (3.0, None), (6.0, Some(150.0))],
            UnclassifiedMode::Count,
        )
        .unwrap();

        assert_eq!(totals.z3, 1 + 3);
        assert_eq!(totals.unclassified, 1);
    }

    #[test]
    fn test_unclassified_seconds_mode() {
        let totals = running(
            &[(0.0, Some(150.0)), (1.0, None), (3.0, None), (6.0, Some(150.0))],
            UnclassifiedMode::Seconds,
        )
        .unwrap();

        assert_eq!(totals.unclassified, 2);
    }

    #[test]
    fn test_zero_delta_accepted() {
        let totals = running(
            &[(0.0, Some(130.0)), (0.0, Some(130.0)), (3.0, Some(130.0))],
            UnclassifiedMode::Count,
        )
        .unwrap();
        assert_eq!(totals.z2, 3);
    }

    #[test]
    fn test_negative_delta_is_integrity_error() {
        let err = running(
            &[(0.0, Some(130.0)), (10.0, Some(130.0)), (9.0, Some(130.0))],
            UnclassifiedMode::Count,
        )
        .unwrap_err();

        match err {
            ActivityError::Integrity { sample, elapsed, .. } => {
                assert_eq!(sample, 2);
                assert_eq!(elapsed, "9");
            }
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_heart_rate_names_sample_and_time() {
        let detail = RawActivityDetail::from_columns(
            &[(HEART_RATE_KEY, 0), (ELAPSED_TIME_KEY, 1)],
            vec![
                vec![json!(120), json!(0.0)],
                vec![json!("high"), json!(4.5)],
            ],
        );
        let series = SampleSeries::from_detail(99, &detail).unwrap();
        let err = ZoneAccumulator::new(&RUNNING_ZONES, UnclassifiedMode::Count)
            .accumulate(&series)
            .unwrap_err();

        let msg = err.to_string();
        assert_eq!(err.activity_id(), 99);
        assert!(msg.contains("sample 1"));
        assert!(msg.contains("elapsed=4.5"));
        assert!(msg.contains("\"high\""));
    }

    #[test]
    fn test_carried_forward_non_numeric_heart_rate_names_interval_sample() {
        let detail = RawActivityDetail::from_columns(
            &[(HEART_RATE_KEY, 0), (ELAPSED_TIME_KEY, 1)],
            vec![
                vec![json!("high"), json!(0.0)],
                vec![Value::Null, json!(3.0)],
            ],
        );
        let series = SampleSeries::from_detail(7, &detail).unwrap();
        let err = ZoneAccumulator::new(&RUNNING_ZONES, UnclassifiedMode::Count)
            .accumulate(&series)
            .unwrap_err();

        assert_eq!(err.kind(), "integrity");
        let msg = err.to_string();
        assert!(msg.contains("sample 1"));
        assert!(msg.contains("elapsed=3"));
        assert!(msg.contains("heart rate at sample 0"));
        assert!(msg.contains("\"high\""));
    }

    #[test]
    fn test_fractional_accumulation_truncated_at_end() {
        let totals = running(
            &[(0.0, Some(130.0)), (0.6, Some(130.0)), (1.2, Some(130.0)), (1.8, Some(130.0))],
            UnclassifiedMode::Count,
        )
        .unwrap();
        // 1.8 seconds accumulated, truncated once
        assert_eq!(totals.z2, 1);
    }

    #[test]
    fn test_short_series_yields_zero_totals() {
        assert_eq!(running(&[], UnclassifiedMode::Count).unwrap(), ZoneTotals::default());
        assert_eq!(
            running(&[(0.0, Some(150.0))], UnclassifiedMode::Count).unwrap(),
            ZoneTotals::default()
        );
    }

    #[test]
    fn test_cycling_table_used_for_cycling_key() {
        let moderate = detail(&[(0.0, Some(145.0)), (10.0, Some(145.0))]);
        let series = SampleSeries::from_detail(1, &moderate).unwrap();

        let cycling = zone_distribution(&series, "virtual_ride", UnclassifiedMode::Count).unwrap();
        let running = zone_distribution(&series, "running", UnclassifiedMode::Count).unwrap();

        assert_eq!(cycling.z2, 10);
        assert_eq!(running.z2, 10);

        let harder = detail(&[(0.0, Some(150.0)), (10.0, Some(150.0))]);
        let series = SampleSeries::from_detail(1, &harder).unwrap();
        assert_eq!(zone_distribution(&series, "cycling", UnclassifiedMode::Count).unwrap().z2, 10);
        assert_eq!(zone_distribution(&series, "running", UnclassifiedMode::Count).unwrap().z3, 10);
    }

    #[test]
    fn test_recompute_is_identical() {
        let samples = [(0.0, Some(100.0)), (3.0, None), (7.0, Some(170.0)), (9.0, None), (12.0, None)];
        let first = running(&samples, UnclassifiedMode::Count).unwrap();
        let second = running(&samples, UnclassifiedMode::Count).unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_full_coverage_conserves_elapsed_time(
            steps in prop::collection::vec((0u32..30, 60u32..200), 2..60)
        ) {
            let mut elapsed = 0.0;
            let samples: Vec<(f64, Option<f64>)> = steps
                .iter()
                .map(|(delta, hr)| {
                    elapsed += *delta as f64;
                    (elapsed, Some(*hr as f64))
                })
                .collect();
            let first = samples[0].0;

            let totals = running(&samples, UnclassifiedMode::Count).unwrap();
            prop_assert_eq!(totals.classified_seconds(), (elapsed - first) as u64);
            prop_assert_eq!(totals.unclassified, 0);
        }

        #[test]
        fn test_band_is_monotonic_in_heart_rate(a in 0.0f64..230.0, b in 0.0f64..230.0) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            for table in [RUNNING_ZONES, CYCLING_ZONES] {
                prop_assert!(table.band_for(low) <= table.band_for(high));
            }
        }
    }
}
