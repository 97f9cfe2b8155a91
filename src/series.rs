//! Typed view over one activity's raw per-sample detail
//!
//! The platform delivers detail as a descriptor table (semantic key to column
//! index) and a list of rows, each a parallel vector of nullable numbers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActivityError;
use crate::models::ActivityId;

/// Descriptor key of the heart rate column
pub const HEART_RATE_KEY: &str = "directHeartRate";

/// Descriptor key of the cumulative elapsed time column (seconds)
pub const ELAPSED_TIME_KEY: &str = "sumElapsedDuration";

/// Maps a metric's semantic key to its column in every sample row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDescriptor {
    pub key: String,
    pub metrics_index: usize,
}

/// One sample row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub metrics: Vec<Value>,
}

/// Raw detail document as stored in the detail store
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivityDetail {
    #[serde(default)]
    pub metric_descriptors: Vec<MetricDescriptor>,

    #[serde(default)]
    pub activity_detail_metrics: Vec<DetailRow>,
}

impl RawActivityDetail {
    /// Build a detail document from descriptor pairs and row vectors
    pub fn from_columns(descriptors: &[(&str, usize)], rows: Vec<Vec<Value>>) -> Self {
        Self {
            metric_descriptors: descriptors
                .iter()
                .map(|(key, index)| MetricDescriptor {
                    key: (*key).to_string(),
                    metrics_index: *index,
                })
                .collect(),
            activity_detail_metrics: rows.into_iter().map(|metrics| DetailRow { metrics }).collect(),
        }
    }
}

/// Ordered sample series of one activity with its heart rate and elapsed
/// time columns resolved up front.
#[derive(Debug, Clone)]
pub struct SampleSeries<'a> {
    activity_id: ActivityId,
    detail: &'a RawActivityDetail,
    heart_rate_column: usize,
    elapsed_column: usize,
}

impl<'a> SampleSeries<'a> {
    /// Wrap raw detail, failing if either required metric is absent
    pub fn from_detail(
        activity_id: ActivityId,
        detail: &'a RawActivityDetail,
    ) -> Result<Self, ActivityError> {
        let heart_rate_column = lookup(activity_id, detail, HEART_RATE_KEY)?;
        let elapsed_column = lookup(activity_id, detail, ELAPSED_TIME_KEY)?;

        Ok(Self {
            activity_id,
            detail,
            heart_rate_column,
            elapsed_column,
        })
    }

    pub fn activity_id(&self) -> ActivityId {
        self.activity_id
    }

    /// Column index of a metric by descriptor key
    pub fn index_of(&self, key: &str) -> Result<usize, ActivityError> {
        lookup(self.activity_id, self.detail, key)
    }

    /// Sample count
    pub fn len(&self) -> usize {
        self.detail.activity_detail_metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric value at (row, column); `None` for a null reading.
    ///
    /// Short rows and non-numeric values are integrity violations.
    pub fn value_at(&self, row: usize, column: usize) -> Result<Option<f64>, ActivityError> {
        let sample = self.detail.activity_detail_metrics.get(row).ok_or_else(|| {
            self.integrity(row, "n/a", format!("sample index out of range (len={})", self.len()))
        })?;

        match sample.metrics.get(column) {
            None => Err(self.integrity(
                row,
                "n/a",
                format!("row has {} values, column {} requested", sample.metrics.len(), column),
            )),
            Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.integrity(row, "n/a", format!("unrepresentable number {}", n))),
            Some(other) => Err(self.integrity(
                row,
                "n/a",
                format!("expected a number in column {}, found {}", column, other),
            )),
        }
    }

    /// Heart rate reading of a sample, if any
    pub fn heart_rate_at(&self, row: usize) -> Result<Option<f64>, ActivityError> {
        self.value_at(row, self.heart_rate_column)
    }

    /// Elapsed seconds of a sample; a missing value is an integrity violation
    pub fn elapsed_at(&self, row: usize) -> Result<f64, ActivityError> {
        self.value_at(row, self.elapsed_column)?
            .ok_or_else(|| self.integrity(row, "null", "missing elapsed time".to_string()))
    }

    /// Raw JSON value in a column, for error context
    pub(crate) fn raw_value(&self, row: usize, column: usize) -> Option<&Value> {
        self.detail
            .activity_detail_metrics
            .get(row)
            .and_then(|sample| sample.metrics.get(column))
    }

    pub(crate) fn heart_rate_column(&self) -> usize {
        self.heart_rate_column
    }

    pub(crate) fn integrity(&self, sample: usize, elapsed: impl ToString, reason: String) -> ActivityError {
        ActivityError::Integrity {
            activity_id: self.activity_id,
            sample,
            elapsed: elapsed.to_string(),
            reason,
        }
    }
}

fn lookup(activity_id: ActivityId, detail: &RawActivityDetail, key: &str) -> Result<usize, ActivityError> {
    detail
        .metric_descriptors
        .iter()
        .find(|d| d.key == key)
        .map(|d| d.metrics_index)
        .ok_or_else(|| ActivityError::MetricNotFound {
            activity_id,
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detail() -> RawActivityDetail {
        RawActivityDetail::from_columns(
            &[("directSpeed", 0), (HEART_RATE_KEY, 1), (ELAPSED_TIME_KEY, 2)],
            vec![
                vec![json!(2.5), json!(120), json!(0.0)],
                vec![json!(2.6), Value::Null, json!(1.0)],
                vec![json!(2.7), json!("bad"), json!(2.0)],
            ],
        )
    }

    #[test]
    fn test_index_lookup() {
        let detail = detail();
        let series = SampleSeries::from_detail(7, &detail).unwrap();
        assert_eq!(series.index_of("directSpeed").unwrap(), 0);
        assert_eq!(series.index_of(HEART_RATE_KEY).unwrap(), 1);
        assert_eq!(series.len(), 3);

        let err = series.index_of("directPower").unwrap_err();
        assert_eq!(
            err,
            ActivityError::MetricNotFound {
                activity_id: 7,
                key: "directPower".to_string()
            }
        );
    }

    #[test]
    fn test_value_access() {
        let detail = detail();
        let series = SampleSeries::from_detail(7, &detail).unwrap();
        assert_eq!(series.heart_rate_at(0).unwrap(), Some(120.0));
        assert_eq!(series.heart_rate_at(1).unwrap(), None);
        assert_eq!(series.elapsed_at(1).unwrap(), 1.0);

        let err = series.heart_rate_at(2).unwrap_err();
        assert_eq!(err.kind(), "integrity");
        assert!(err.to_string().contains("sample 2"));
    }

    #[test]
    fn test_missing_heart_rate_descriptor() {
        let detail = RawActivityDetail::from_columns(&[(ELAPSED_TIME_KEY, 0)], vec![vec![json!(0)]]);
        let err = SampleSeries::from_detail(11, &detail).unwrap_err();
        assert_eq!(
            err,
            ActivityError::MetricNotFound {
                activity_id: 11,
                key: HEART_RATE_KEY.to_string()
            }
        );
    }

    #[test]
    fn test_missing_elapsed_descriptor() {
        let detail = RawActivityDetail::from_columns(&[(HEART_RATE_KEY, 0)], vec![vec![json!(100)]]);
        let err = SampleSeries::from_detail(12, &detail).unwrap_err();
        assert!(matches!(err, ActivityError::MetricNotFound { ref key, .. } if key == ELAPSED_TIME_KEY));
    }

    #[test]
    fn test_short_row_is_integrity_error() {
        let detail = RawActivityDetail::from_columns(
            &[(HEART_RATE_KEY, 0), (ELAPSED_TIME_KEY, 3)],
            vec![vec![json!(100), json!(1)]],
        );
        let series = SampleSeries::from_detail(5, &detail).unwrap();
        let err = series.elapsed_at(0).unwrap_err();
        assert!(matches!(err, ActivityError::Integrity { sample: 0, .. }));
    }

    #[test]
    fn test_detail_json_shape() {
        let raw = r#"{
            "activityId": 1,
            "metricDescriptors": [
                {"metricsIndex": 0, "key": "sumElapsedDuration", "unit": {"key": "second"}},
                {"metricsIndex": 1, "key": "directHeartRate"}
            ],
            "activityDetailMetrics": [
                {"metrics": [0.0, 98.0]},
                {"metrics": [1.0, null]}
            ]
        }"#;
        let detail: RawActivityDetail = serde_json::from_str(raw).unwrap();
        let series = SampleSeries::from_detail(1, &detail).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.heart_rate_at(0).unwrap(), Some(98.0));
    }
}
