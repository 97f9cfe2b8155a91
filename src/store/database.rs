use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{ActivityMetadataReader, ActivityMetadataWriter, TotalsWriter};
use crate::error::{ActivityError, StoreError};
use crate::models::{Activity, ActivityId, ActivityType, ZoneTotals};

const ACTIVITY_COLUMNS: &str = r#"
    activity_id, start_time_local, type_key, type_id, parent_type_id,
    distance, elapsed_duration, duration, elevation_gain, elevation_loss,
    average_speed, average_hr, max_hr, aerobic_training_effect, anaerobic_training_effect,
    time_in_hr_zone
"#;

/// SQLite-backed activity metadata store
pub struct ActivityDatabase {
    conn: Mutex<Connection>,
}

impl ActivityDatabase {
    /// Create or open a database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema with tables and indexes
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        // journal_mode returns a row, so it cannot go through execute
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous=NORMAL", [])?;

        // Decimal columns hold their string form to keep exact values
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                activity_id INTEGER PRIMARY KEY,
                start_time_local TEXT NOT NULL,
                type_key TEXT NOT NULL,
                type_id INTEGER,
                parent_type_id INTEGER,

                distance TEXT,
                elapsed_duration TEXT,
                duration TEXT,
                elevation_gain TEXT,
                elevation_loss TEXT,
                average_speed TEXT,
                average_hr TEXT,
                max_hr TEXT,
                aerobic_training_effect TEXT,
                anaerobic_training_effect TEXT,

                -- JSON document, written by the zone pipeline
                time_in_hr_zone TEXT,

                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_activities_start ON activities (start_time_local)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_activities_type ON activities (type_key)",
            [],
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Load one activity by id
    pub fn load_activity(&self, activity_id: ActivityId) -> Result<Option<Activity>, StoreError> {
        let conn = self.lock()?;
        let query = format!("SELECT {} FROM activities WHERE activity_id = ?1", ACTIVITY_COLUMNS);
        let row = conn
            .query_row(&query, params![activity_id], |row| Ok(RawRow::from_row(row)))
            .optional()?;

        row.map(|r| r?.into_activity()).transpose()
    }

    /// Number of stored activities, and how many have zone totals
    pub fn get_stats(&self) -> Result<DatabaseStats, StoreError> {
        let conn = self.lock()?;
        let activity_count: i64 = conn.query_row("SELECT COUNT(*) FROM activities", [], |row| row.get(0))?;
        let with_zones: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE time_in_hr_zone IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(DatabaseStats {
            activity_count: activity_count as usize,
            with_zone_totals: with_zones as usize,
        })
    }

    fn query_activities(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Activity>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| Ok(RawRow::from_row(row)))?;

        let mut activities = Vec::new();
        for row in rows {
            activities.push(row??.into_activity()?);
        }
        Ok(activities)
    }
}

impl ActivityMetadataReader for ActivityDatabase {
    fn query_by_date_range(&self, start: &str, end: &str) -> Result<Vec<Activity>, StoreError> {
        // TEXT comparison under the default BINARY collation is byte-wise
        let sql = format!(
            "SELECT {} FROM activities WHERE start_time_local BETWEEN ?1 AND ?2 ORDER BY start_time_local",
            ACTIVITY_COLUMNS
        );
        self.query_activities(&sql, &[&start, &end])
    }

    fn all_activities(&self) -> Result<Vec<Activity>, StoreError> {
        let sql = format!("SELECT {} FROM activities ORDER BY start_time_local", ACTIVITY_COLUMNS);
        self.query_activities(&sql, &[])
    }

    fn activity_ids(&self) -> Result<Vec<ActivityId>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT activity_id FROM activities ORDER BY activity_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

impl ActivityMetadataWriter for ActivityDatabase {
    fn put_activities(&self, activities: &[Activity]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for activity in activities {
            let zones = activity
                .time_in_hr_zone
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            tx.execute(
                r#"
                INSERT INTO activities (
                    activity_id, start_time_local, type_key, type_id, parent_type_id,
                    distance, elapsed_duration, duration, elevation_gain, elevation_loss,
                    average_speed, average_hr, max_hr, aerobic_training_effect, anaerobic_training_effect,
                    time_in_hr_zone
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(activity_id) DO UPDATE SET
                    start_time_local = excluded.start_time_local,
                    type_key = excluded.type_key,
                    type_id = excluded.type_id,
                    parent_type_id = excluded.parent_type_id,
                    distance = excluded.distance,
                    elapsed_duration = excluded.elapsed_duration,
                    duration = excluded.duration,
                    elevation_gain = excluded.elevation_gain,
                    elevation_loss = excluded.elevation_loss,
                    average_speed = excluded.average_speed,
                    average_hr = excluded.average_hr,
                    max_hr = excluded.max_hr,
                    aerobic_training_effect = excluded.aerobic_training_effect,
                    anaerobic_training_effect = excluded.anaerobic_training_effect,
                    time_in_hr_zone = COALESCE(excluded.time_in_hr_zone, activities.time_in_hr_zone),
                    updated_at = CURRENT_TIMESTAMP
                "#,
                params![
                    activity.activity_id,
                    activity.start_time_local,
                    activity.activity_type.type_key,
                    activity.activity_type.type_id,
                    activity.activity_type.parent_type_id,
                    decimal_text(activity.distance),
                    decimal_text(activity.elapsed_duration),
                    decimal_text(activity.duration),
                    decimal_text(activity.elevation_gain),
                    decimal_text(activity.elevation_loss),
                    decimal_text(activity.average_speed),
                    decimal_text(activity.average_hr),
                    decimal_text(activity.max_hr),
                    decimal_text(activity.aerobic_training_effect),
                    decimal_text(activity.anaerobic_training_effect),
                    zones,
                ],
            )?;
        }

        tx.commit()?;
        debug!(count = activities.len(), "Activities written");
        Ok(())
    }
}

impl TotalsWriter for ActivityDatabase {
    fn write_zone_totals(&self, activity_id: ActivityId, totals: &ZoneTotals) -> Result<(), ActivityError> {
        let write_failed = |reason: String| ActivityError::WriteFailed { activity_id, reason };

        let json = serde_json::to_string(totals).map_err(|e| write_failed(e.to_string()))?;
        let conn = self.conn.lock().map_err(|_| write_failed("connection lock poisoned".to_string()))?;

        let updated = conn
            .execute(
                "UPDATE activities SET time_in_hr_zone = ?1, updated_at = CURRENT_TIMESTAMP WHERE activity_id = ?2",
                params![json, activity_id],
            )
            .map_err(|e| write_failed(e.to_string()))?;

        if updated == 0 {
            return Err(write_failed("no metadata record for activity".to_string()));
        }
        Ok(())
    }
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub activity_count: usize,
    pub with_zone_totals: usize,
}

/// Column values as read, converted outside the rusqlite closure so that
/// decimal and JSON failures surface as `StoreError`
struct RawRow {
    activity_id: i64,
    start_time_local: String,
    type_key: String,
    type_id: Option<i64>,
    parent_type_id: Option<i64>,
    decimals: [Option<String>; 10],
    time_in_hr_zone: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            activity_id: row.get("activity_id")?,
            start_time_local: row.get("start_time_local")?,
            type_key: row.get("type_key")?,
            type_id: row.get("type_id")?,
            parent_type_id: row.get("parent_type_id")?,
            decimals: [
                row.get("distance")?,
                row.get("elapsed_duration")?,
                row.get("duration")?,
                row.get("elevation_gain")?,
                row.get("elevation_loss")?,
                row.get("average_speed")?,
                row.get("average_hr")?,
                row.get("max_hr")?,
                row.get("aerobic_training_effect")?,
                row.get("anaerobic_training_effect")?,
            ],
            time_in_hr_zone: row.get("time_in_hr_zone")?,
        })
    }

    fn into_activity(self) -> Result<Activity, StoreError> {
        let [distance, elapsed_duration, duration, elevation_gain, elevation_loss, average_speed, average_hr, max_hr, aerobic, anaerobic] =
            self.decimals;

        Ok(Activity {
            activity_id: self.activity_id,
            start_time_local: self.start_time_local,
            activity_type: ActivityType {
                type_key: self.type_key,
                type_id: self.type_id,
                parent_type_id: self.parent_type_id,
            },
            distance: parse_decimal("distance", distance)?,
            elapsed_duration: parse_decimal("elapsed_duration", elapsed_duration)?,
            duration: parse_decimal("duration", duration)?,
            elevation_gain: parse_decimal("elevation_gain", elevation_gain)?,
            elevation_loss: parse_decimal("elevation_loss", elevation_loss)?,
            average_speed: parse_decimal("average_speed", average_speed)?,
            average_hr: parse_decimal("average_hr", average_hr)?,
            max_hr: parse_decimal("max_hr", max_hr)?,
            aerobic_training_effect: parse_decimal("aerobic_training_effect", aerobic)?,
            anaerobic_training_effect: parse_decimal("anaerobic_training_effect", anaerobic)?,
            time_in_hr_zone: self
                .time_in_hr_zone
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        })
    }
}

fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

fn parse_decimal(field: &str, value: Option<String>) -> Result<Option<Decimal>, StoreError> {
    value
        .map(|s| {
            s.parse::<Decimal>().map_err(|_| StoreError::InvalidValue {
                field: field.to_string(),
                value: s.clone(),
            })
        })
        .transpose()
}
