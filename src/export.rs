use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

use crate::models::{Activity, ActivityId};

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// One exported line: an activity and its stored zone totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneExportRow {
    pub activity_id: ActivityId,
    pub start_time_local: String,
    pub type_key: String,
    pub z0: u64,
    pub z1: u64,
    pub z2: u64,
    pub z3: u64,
    pub z4: u64,
    pub z5: u64,
    #[serde(rename = "NoValue")]
    pub no_value: u64,
}

impl ZoneExportRow {
    /// `None` when zones were never computed for the activity
    pub fn from_activity(activity: &Activity) -> Option<Self> {
        let totals = activity.time_in_hr_zone?;
        Some(Self {
            activity_id: activity.activity_id,
            start_time_local: activity.start_time_local.clone(),
            type_key: activity.type_key().to_string(),
            z0: totals.z0,
            z1: totals.z1,
            z2: totals.z2,
            z3: totals.z3,
            z4: totals.z4,
            z5: totals.z5,
            no_value: totals.unclassified,
        })
    }
}

/// Rows for every activity that has zone totals, in input order
pub fn zone_rows(activities: &[Activity]) -> Vec<ZoneExportRow> {
    activities.iter().filter_map(ZoneExportRow::from_activity).collect()
}

/// Write zone rows as CSV with a header line
pub fn write_zone_csv<W: Write>(rows: &[ZoneExportRow], writer: W) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write zone rows as a pretty-printed JSON array
pub fn write_zone_json<W: Write>(rows: &[ZoneExportRow], mut writer: W) -> Result<(), ExportError> {
    let json_data = serde_json::to_string_pretty(rows)?;
    writer.write_all(json_data.as_bytes())?;
    Ok(())
}

/// Export per-activity zone totals to `output_path`; returns the number of rows
pub fn export_zone_totals<P: AsRef<Path>>(
    activities: &[Activity],
    format: ExportFormat,
    output_path: P,
) -> Result<usize, ExportError> {
    let rows = zone_rows(activities);
    let file = File::create(output_path.as_ref())?;

    match format {
        ExportFormat::Csv => write_zone_csv(&rows, file)?,
        ExportFormat::Json => write_zone_json(&rows, file)?,
    }

    info!(
        "Exported {} of {} activities to {}",
        rows.len(),
        activities.len(),
        output_path.as_ref().display()
    );
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ZoneTotals;
    use tempfile::NamedTempFile;

    fn activities() -> Vec<Activity> {
        let mut with_zones = Activity::new(11, "2025-05-04 08:15:00", "running");
        with_zones.time_in_hr_zone = Some(ZoneTotals {
            z1: 300,
            z2: 1200,
            unclassified: 3,
            ..Default::default()
        });
        let without = Activity::new(12, "2025-05-05 08:15:00", "cycling");
        vec![with_zones, without]
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(ExportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_export_csv() {
        let temp_file = NamedTempFile::new().unwrap();
        let written = export_zone_totals(&activities(), ExportFormat::Csv, temp_file.path()).unwrap();
        assert_eq!(written, 1);

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("activity_id,start_time_local,type_key,z0,z1,z2,z3,z4,z5,NoValue")
        );
        assert_eq!(lines.next(), Some("11,2025-05-04 08:15:00,running,0,300,1200,0,0,0,3"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_export_json() {
        let temp_file = NamedTempFile::new().unwrap();
        export_zone_totals(&activities(), ExportFormat::Json, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("\"activity_id\": 11"));
        assert!(content.contains("\"NoValue\": 3"));
        assert!(!content.contains("\"activity_id\": 12"));
    }
}
