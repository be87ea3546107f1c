//! SQLite-based health storage
//!
//! One table per record variant with the natural key as primary key. Raw
//! activity payloads are stored zstd-compressed.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use rusqlite_migration::{M, Migrations};

use super::HealthStore;
use super::traits::check_domain;
use crate::models::{
    Activity, ActivityId, BodyCompositionReading, CollectionLogEntry, DailySummary, Domain,
    HealthRecord, HeartRateSample, HrvReading, RespirationSample, SleepSession, StressSample,
    SyncCursor, SyncStatus, TrackPoint,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Watermark per data domain
            CREATE TABLE sync_cursors (
                domain TEXT PRIMARY KEY,
                last_synced_at TEXT NOT NULL,
                last_status TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Append-only audit trail, one row per scope per run
            CREATE TABLE collection_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                status TEXT NOT NULL,
                records_collected INTEGER NOT NULL DEFAULT 0,
                error_detail TEXT
            );

            CREATE INDEX idx_collection_log_run_id ON collection_log(run_id);

            CREATE TABLE daily_summaries (
                calendar_date TEXT PRIMARY KEY,
                total_steps INTEGER,
                total_distance_meters REAL,
                active_seconds INTEGER,
                highly_active_seconds INTEGER,
                sedentary_seconds INTEGER,
                calories_total REAL,
                calories_active REAL,
                floors_climbed REAL,
                resting_heart_rate INTEGER,
                min_heart_rate INTEGER,
                max_heart_rate INTEGER,
                avg_stress_level INTEGER,
                max_stress_level INTEGER,
                body_battery_charged INTEGER,
                body_battery_drained INTEGER,
                body_battery_highest INTEGER,
                body_battery_lowest INTEGER,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE activities (
                activity_id INTEGER PRIMARY KEY,
                name TEXT,
                activity_type TEXT,
                start_time TEXT NOT NULL,
                duration_seconds REAL,
                distance_meters REAL,
                elevation_gain_meters REAL,
                elevation_loss_meters REAL,
                avg_speed_mps REAL,
                max_speed_mps REAL,
                avg_heart_rate REAL,
                max_heart_rate REAL,
                calories REAL,
                start_latitude REAL,
                start_longitude REAL,
                raw_json BLOB,  -- zstd compressed
                updated_at TEXT NOT NULL
            );

            CREATE INDEX idx_activities_start_time ON activities(start_time);

            CREATE TABLE sleep_sessions (
                calendar_date TEXT PRIMARY KEY,
                sleep_start TEXT,
                sleep_end TEXT,
                total_sleep_seconds INTEGER,
                deep_sleep_seconds INTEGER,
                light_sleep_seconds INTEGER,
                rem_sleep_seconds INTEGER,
                awake_seconds INTEGER,
                sleep_score INTEGER,
                avg_respiration REAL,
                avg_spo2 REAL,
                lowest_spo2 REAL,
                restless_moments INTEGER,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE heart_rate_samples (
                timestamp_ms INTEGER PRIMARY KEY,
                bpm INTEGER NOT NULL
            );

            CREATE TABLE stress_samples (
                timestamp_ms INTEGER PRIMARY KEY,
                stress_level INTEGER,
                body_battery INTEGER
            );

            CREATE TABLE body_composition (
                measured_at_ms INTEGER PRIMARY KEY,
                weight_kg REAL,
                bmi REAL,
                body_fat_percentage REAL,
                body_water_percentage REAL,
                bone_mass_kg REAL,
                muscle_mass_kg REAL,
                source TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE track_points (
                activity_id INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                timestamp_ms INTEGER,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                altitude_meters REAL,
                PRIMARY KEY (activity_id, sequence)
            );
            "#,
        ),
        // Migration 2: Recent-first log reads
        M::up(
            r#"
            CREATE INDEX idx_collection_log_started_at
                ON collection_log(started_at DESC);
            "#,
        ),
        // Migration 3: HRV and respiration series
        M::up(
            r#"
            CREATE TABLE hrv_readings (
                timestamp_ms INTEGER PRIMARY KEY,
                hrv_ms REAL NOT NULL
            );

            CREATE TABLE respiration_samples (
                timestamp_ms INTEGER PRIMARY KEY,
                breaths_per_minute REAL NOT NULL
            );
            "#,
        ),
    ])
}

/// Table holding a domain's records
fn table_for(domain: Domain) -> &'static str {
    match domain {
        Domain::DailySummary => "daily_summaries",
        Domain::Activities => "activities",
        Domain::Sleep => "sleep_sessions",
        Domain::HeartRate => "heart_rate_samples",
        Domain::Stress => "stress_samples",
        Domain::Hrv => "hrv_readings",
        Domain::Respiration => "respiration_samples",
        Domain::BodyComposition => "body_composition",
        Domain::ActivityGps => "track_points",
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort as text
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp: {s}"))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse()
        .with_context(|| format!("Invalid stored date: {s}"))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("Invalid stored timestamp: {ms}"))
}

/// SQLite-based health storage
pub struct SqliteHealthStore {
    conn: Mutex<Connection>,
}

impl SqliteHealthStore {
    /// Open (or create) the database at `db_path` and bring the schema up
    /// to date
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        // journal_mode = WAL:
        //   - Readers (status reports) never block the cycle's writes
        //
        // synchronous = NORMAL:
        //   - fsync only at WAL checkpoints
        //
        // cache_size = -16000:
        //   - Negative value = KB (16MB cache)
        //
        // temp_store = MEMORY:
        //   - Temporary tables/indices stored in RAM
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_cursor(conn: &Connection, domain: Domain) -> Result<Option<SyncCursor>> {
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT last_synced_at, last_status FROM sync_cursors WHERE domain = ?",
                [domain.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(last_synced_at, last_status)| {
            Ok(SyncCursor::new(
                domain,
                parse_ts(&last_synced_at)?,
                last_status.parse::<SyncStatus>()?,
            ))
        })
        .transpose()
    }

    fn save_cursor(tx: &Transaction<'_>, cursor: &SyncCursor) -> Result<()> {
        tx.execute(
            "INSERT INTO sync_cursors (domain, last_synced_at, last_status, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(domain) DO UPDATE SET
                last_synced_at = excluded.last_synced_at,
                last_status = excluded.last_status,
                updated_at = excluded.updated_at",
            params![
                cursor.domain.as_str(),
                ts(&cursor.last_synced_at),
                cursor.last_status.as_str(),
                ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn upsert_record(tx: &Transaction<'_>, record: &HealthRecord) -> Result<()> {
        let updated_at = ts(&Utc::now());

        match record {
            HealthRecord::DailySummary(r) => {
                tx.execute(
                    "INSERT INTO daily_summaries
                     (calendar_date, total_steps, total_distance_meters, active_seconds,
                      highly_active_seconds, sedentary_seconds, calories_total, calories_active,
                      floors_climbed, resting_heart_rate, min_heart_rate, max_heart_rate,
                      avg_stress_level, max_stress_level, body_battery_charged,
                      body_battery_drained, body_battery_highest, body_battery_lowest, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(calendar_date) DO UPDATE SET
                        total_steps = excluded.total_steps,
                        total_distance_meters = excluded.total_distance_meters,
                        active_seconds = excluded.active_seconds,
                        highly_active_seconds = excluded.highly_active_seconds,
                        sedentary_seconds = excluded.sedentary_seconds,
                        calories_total = excluded.calories_total,
                        calories_active = excluded.calories_active,
                        floors_climbed = excluded.floors_climbed,
                        resting_heart_rate = excluded.resting_heart_rate,
                        min_heart_rate = excluded.min_heart_rate,
                        max_heart_rate = excluded.max_heart_rate,
                        avg_stress_level = excluded.avg_stress_level,
                        max_stress_level = excluded.max_stress_level,
                        body_battery_charged = excluded.body_battery_charged,
                        body_battery_drained = excluded.body_battery_drained,
                        body_battery_highest = excluded.body_battery_highest,
                        body_battery_lowest = excluded.body_battery_lowest,
                        updated_at = excluded.updated_at",
                    params![
                        r.calendar_date.to_string(),
                        r.total_steps,
                        r.total_distance_meters,
                        r.active_seconds,
                        r.highly_active_seconds,
                        r.sedentary_seconds,
                        r.calories_total,
                        r.calories_active,
                        r.floors_climbed,
                        r.resting_heart_rate,
                        r.min_heart_rate,
                        r.max_heart_rate,
                        r.avg_stress_level,
                        r.max_stress_level,
                        r.body_battery_charged,
                        r.body_battery_drained,
                        r.body_battery_highest,
                        r.body_battery_lowest,
                        updated_at,
                    ],
                )?;
            }
            HealthRecord::Activity(r) => {
                // Compress the raw payload with zstd (level 3 = good balance of speed vs compression)
                let raw_json = r
                    .raw_json
                    .as_ref()
                    .map(|raw| zstd::encode_all(raw.as_bytes(), 3))
                    .transpose()
                    .context("Failed to compress raw activity JSON")?;

                tx.execute(
                    "INSERT INTO activities
                     (activity_id, name, activity_type, start_time, duration_seconds,
                      distance_meters, elevation_gain_meters, elevation_loss_meters,
                      avg_speed_mps, max_speed_mps, avg_heart_rate, max_heart_rate, calories,
                      start_latitude, start_longitude, raw_json, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(activity_id) DO UPDATE SET
                        name = excluded.name,
                        activity_type = excluded.activity_type,
                        start_time = excluded.start_time,
                        duration_seconds = excluded.duration_seconds,
                        distance_meters = excluded.distance_meters,
                        elevation_gain_meters = excluded.elevation_gain_meters,
                        elevation_loss_meters = excluded.elevation_loss_meters,
                        avg_speed_mps = excluded.avg_speed_mps,
                        max_speed_mps = excluded.max_speed_mps,
                        avg_heart_rate = excluded.avg_heart_rate,
                        max_heart_rate = excluded.max_heart_rate,
                        calories = excluded.calories,
                        start_latitude = excluded.start_latitude,
                        start_longitude = excluded.start_longitude,
                        raw_json = excluded.raw_json,
                        updated_at = excluded.updated_at",
                    params![
                        r.activity_id.value(),
                        r.name,
                        r.activity_type,
                        ts(&r.start_time),
                        r.duration_seconds,
                        r.distance_meters,
                        r.elevation_gain_meters,
                        r.elevation_loss_meters,
                        r.avg_speed_mps,
                        r.max_speed_mps,
                        r.avg_heart_rate,
                        r.max_heart_rate,
                        r.calories,
                        r.start_latitude,
                        r.start_longitude,
                        raw_json,
                        updated_at,
                    ],
                )?;
            }
            HealthRecord::Sleep(r) => {
                tx.execute(
                    "INSERT INTO sleep_sessions
                     (calendar_date, sleep_start, sleep_end, total_sleep_seconds,
                      deep_sleep_seconds, light_sleep_seconds, rem_sleep_seconds, awake_seconds,
                      sleep_score, avg_respiration, avg_spo2, lowest_spo2, restless_moments,
                      updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(calendar_date) DO UPDATE SET
                        sleep_start = excluded.sleep_start,
                        sleep_end = excluded.sleep_end,
                        total_sleep_seconds = excluded.total_sleep_seconds,
                        deep_sleep_seconds = excluded.deep_sleep_seconds,
                        light_sleep_seconds = excluded.light_sleep_seconds,
                        rem_sleep_seconds = excluded.rem_sleep_seconds,
                        awake_seconds = excluded.awake_seconds,
                        sleep_score = excluded.sleep_score,
                        avg_respiration = excluded.avg_respiration,
                        avg_spo2 = excluded.avg_spo2,
                        lowest_spo2 = excluded.lowest_spo2,
                        restless_moments = excluded.restless_moments,
                        updated_at = excluded.updated_at",
                    params![
                        r.calendar_date.to_string(),
                        r.sleep_start.as_ref().map(ts),
                        r.sleep_end.as_ref().map(ts),
                        r.total_sleep_seconds,
                        r.deep_sleep_seconds,
                        r.light_sleep_seconds,
                        r.rem_sleep_seconds,
                        r.awake_seconds,
                        r.sleep_score,
                        r.avg_respiration,
                        r.avg_spo2,
                        r.lowest_spo2,
                        r.restless_moments,
                        updated_at,
                    ],
                )?;
            }
            HealthRecord::HeartRate(r) => {
                tx.execute(
                    "INSERT INTO heart_rate_samples (timestamp_ms, bpm) VALUES (?, ?)
                     ON CONFLICT(timestamp_ms) DO UPDATE SET bpm = excluded.bpm",
                    params![r.timestamp.timestamp_millis(), r.bpm],
                )?;
            }
            HealthRecord::Stress(r) => {
                tx.execute(
                    "INSERT INTO stress_samples (timestamp_ms, stress_level, body_battery)
                     VALUES (?, ?, ?)
                     ON CONFLICT(timestamp_ms) DO UPDATE SET
                        stress_level = excluded.stress_level,
                        body_battery = excluded.body_battery",
                    params![r.timestamp.timestamp_millis(), r.stress_level, r.body_battery],
                )?;
            }
            HealthRecord::Hrv(r) => {
                tx.execute(
                    "INSERT INTO hrv_readings (timestamp_ms, hrv_ms) VALUES (?, ?)
                     ON CONFLICT(timestamp_ms) DO UPDATE SET hrv_ms = excluded.hrv_ms",
                    params![r.timestamp.timestamp_millis(), r.hrv_ms],
                )?;
            }
            HealthRecord::Respiration(r) => {
                tx.execute(
                    "INSERT INTO respiration_samples (timestamp_ms, breaths_per_minute)
                     VALUES (?, ?)
                     ON CONFLICT(timestamp_ms) DO UPDATE SET
                        breaths_per_minute = excluded.breaths_per_minute",
                    params![r.timestamp.timestamp_millis(), r.breaths_per_minute],
                )?;
            }
            HealthRecord::BodyComposition(r) => {
                tx.execute(
                    "INSERT INTO body_composition
                     (measured_at_ms, weight_kg, bmi, body_fat_percentage, body_water_percentage,
                      bone_mass_kg, muscle_mass_kg, source, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(measured_at_ms) DO UPDATE SET
                        weight_kg = excluded.weight_kg,
                        bmi = excluded.bmi,
                        body_fat_percentage = excluded.body_fat_percentage,
                        body_water_percentage = excluded.body_water_percentage,
                        bone_mass_kg = excluded.bone_mass_kg,
                        muscle_mass_kg = excluded.muscle_mass_kg,
                        source = excluded.source,
                        updated_at = excluded.updated_at",
                    params![
                        r.measured_at.timestamp_millis(),
                        r.weight_kg,
                        r.bmi,
                        r.body_fat_percentage,
                        r.body_water_percentage,
                        r.bone_mass_kg,
                        r.muscle_mass_kg,
                        r.source,
                        updated_at,
                    ],
                )?;
            }
            HealthRecord::TrackPoint(r) => {
                tx.execute(
                    "INSERT INTO track_points
                     (activity_id, sequence, timestamp_ms, latitude, longitude, altitude_meters)
                     VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT(activity_id, sequence) DO UPDATE SET
                        timestamp_ms = excluded.timestamp_ms,
                        latitude = excluded.latitude,
                        longitude = excluded.longitude,
                        altitude_meters = excluded.altitude_meters",
                    params![
                        r.activity_id.value(),
                        r.sequence,
                        r.timestamp.map(|t| t.timestamp_millis()),
                        r.latitude,
                        r.longitude,
                        r.altitude_meters,
                    ],
                )?;
            }
        }
        Ok(())
    }

    fn log_entry_from_row(row: &Row<'_>) -> rusqlite::Result<LogRow> {
        Ok(LogRow {
            run_id: row.get(0)?,
            scope: row.get(1)?,
            started_at: row.get(2)?,
            ended_at: row.get(3)?,
            status: row.get(4)?,
            records_collected: row.get(5)?,
            error_detail: row.get(6)?,
        })
    }

    fn query_logs(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<CollectionLogEntry>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, Self::log_entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(LogRow::into_entry).collect()
    }
}

/// Raw `collection_log` row before parsing
struct LogRow {
    run_id: String,
    scope: String,
    started_at: String,
    ended_at: String,
    status: String,
    records_collected: i64,
    error_detail: Option<String>,
}

impl LogRow {
    fn into_entry(self) -> Result<CollectionLogEntry> {
        Ok(CollectionLogEntry {
            run_id: self.run_id,
            scope: self.scope.parse()?,
            started_at: parse_ts(&self.started_at)?,
            ended_at: parse_ts(&self.ended_at)?,
            status: self.status.parse()?,
            records_collected: self.records_collected.max(0) as usize,
            error_detail: self.error_detail,
        })
    }
}

const LOG_COLUMNS: &str =
    "run_id, scope, started_at, ended_at, status, records_collected, error_detail";

impl HealthStore for SqliteHealthStore {
    fn get_cursor(&self, domain: Domain) -> Result<Option<SyncCursor>> {
        let conn = self.conn.lock().unwrap();
        Self::load_cursor(&conn, domain)
    }

    fn list_cursors(&self) -> Result<Vec<SyncCursor>> {
        let conn = self.conn.lock().unwrap();
        Domain::ALL
            .iter()
            .filter_map(|domain| Self::load_cursor(&conn, *domain).transpose())
            .collect()
    }

    fn commit_domain(
        &self,
        domain: Domain,
        records: &[HealthRecord],
        synced_to: DateTime<Utc>,
        status: SyncStatus,
    ) -> Result<SyncCursor> {
        check_domain(domain, records)?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for record in records {
            Self::upsert_record(&tx, record).with_context(|| {
                format!("Failed to store {} record {}", domain, record.natural_key())
            })?;
        }

        let cursor = match Self::load_cursor(&tx, domain)? {
            Some(existing) => existing.advanced(synced_to, status),
            None => SyncCursor::new(domain, synced_to, status),
        };
        Self::save_cursor(&tx, &cursor)?;

        tx.commit()
            .with_context(|| format!("Failed to commit {domain}"))?;
        Ok(cursor)
    }

    fn record_cursor_status(&self, domain: Domain, status: SyncStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sync_cursors SET last_status = ?, updated_at = ? WHERE domain = ?",
            params![status.as_str(), ts(&Utc::now()), domain.as_str()],
        )?;
        Ok(())
    }

    fn append_log(&self, entry: &CollectionLogEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO collection_log
             (run_id, scope, started_at, ended_at, status, records_collected, error_detail)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.run_id,
                entry.scope.as_str(),
                ts(&entry.started_at),
                ts(&entry.ended_at),
                entry.status.as_str(),
                entry.records_collected as i64,
                entry.error_detail,
            ],
        )?;
        Ok(())
    }

    fn list_logs(&self, run_id: &str) -> Result<Vec<CollectionLogEntry>> {
        let conn = self.conn.lock().unwrap();
        Self::query_logs(
            &conn,
            &format!("SELECT {LOG_COLUMNS} FROM collection_log WHERE run_id = ? ORDER BY id ASC"),
            [run_id],
        )
    }

    fn recent_logs(&self, limit: usize) -> Result<Vec<CollectionLogEntry>> {
        let conn = self.conn.lock().unwrap();
        Self::query_logs(
            &conn,
            &format!("SELECT {LOG_COLUMNS} FROM collection_log ORDER BY id DESC LIMIT ?"),
            [limit as i64],
        )
    }

    fn list_records(&self, domain: Domain) -> Result<Vec<HealthRecord>> {
        let conn = self.conn.lock().unwrap();
        match domain {
            Domain::DailySummary => load_daily_summaries(&conn),
            Domain::Activities => load_activities(&conn),
            Domain::Sleep => load_sleep_sessions(&conn),
            Domain::HeartRate => load_heart_rates(&conn),
            Domain::Stress => load_stress_samples(&conn),
            Domain::Hrv => load_hrv_readings(&conn),
            Domain::Respiration => load_respiration_samples(&conn),
            Domain::BodyComposition => load_body_composition(&conn),
            Domain::ActivityGps => load_track_points(&conn),
        }
    }

    fn count_records(&self, domain: Domain) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table_for(domain)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn load_daily_summaries(conn: &Connection) -> Result<Vec<HealthRecord>> {
    let mut stmt = conn.prepare(
        "SELECT calendar_date, total_steps, total_distance_meters, active_seconds,
                highly_active_seconds, sedentary_seconds, calories_total, calories_active,
                floors_climbed, resting_heart_rate, min_heart_rate, max_heart_rate,
                avg_stress_level, max_stress_level, body_battery_charged, body_battery_drained,
                body_battery_highest, body_battery_lowest
         FROM daily_summaries ORDER BY calendar_date ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let date: String = row.get(0)?;
            Ok((
                date,
                DailySummary {
                    calendar_date: NaiveDate::MIN,
                    total_steps: row.get(1)?,
                    total_distance_meters: row.get(2)?,
                    active_seconds: row.get(3)?,
                    highly_active_seconds: row.get(4)?,
                    sedentary_seconds: row.get(5)?,
                    calories_total: row.get(6)?,
                    calories_active: row.get(7)?,
                    floors_climbed: row.get(8)?,
                    resting_heart_rate: row.get(9)?,
                    min_heart_rate: row.get(10)?,
                    max_heart_rate: row.get(11)?,
                    avg_stress_level: row.get(12)?,
                    max_stress_level: row.get(13)?,
                    body_battery_charged: row.get(14)?,
                    body_battery_drained: row.get(15)?,
                    body_battery_highest: row.get(16)?,
                    body_battery_lowest: row.get(17)?,
                },
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(date, mut summary)| {
            summary.calendar_date = parse_date(&date)?;
            Ok(HealthRecord::DailySummary(summary))
        })
        .collect()
}

fn load_activities(conn: &Connection) -> Result<Vec<HealthRecord>> {
    let mut stmt = conn.prepare(
        "SELECT activity_id, name, activity_type, start_time, duration_seconds, distance_meters,
                elevation_gain_meters, elevation_loss_meters, avg_speed_mps, max_speed_mps,
                avg_heart_rate, max_heart_rate, calories, start_latitude, start_longitude,
                raw_json
         FROM activities ORDER BY activity_id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let start_time: String = row.get(3)?;
            let raw_json: Option<Vec<u8>> = row.get(15)?;
            let mut activity = Activity::new(ActivityId(row.get(0)?), DateTime::<Utc>::MIN_UTC);
            activity.name = row.get(1)?;
            activity.activity_type = row.get(2)?;
            activity.duration_seconds = row.get(4)?;
            activity.distance_meters = row.get(5)?;
            activity.elevation_gain_meters = row.get(6)?;
            activity.elevation_loss_meters = row.get(7)?;
            activity.avg_speed_mps = row.get(8)?;
            activity.max_speed_mps = row.get(9)?;
            activity.avg_heart_rate = row.get(10)?;
            activity.max_heart_rate = row.get(11)?;
            activity.calories = row.get(12)?;
            activity.start_latitude = row.get(13)?;
            activity.start_longitude = row.get(14)?;
            Ok((start_time, raw_json, activity))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(start_time, raw_json, mut activity)| {
            activity.start_time = parse_ts(&start_time)?;
            activity.raw_json = raw_json
                .map(|data| {
                    let bytes = zstd::decode_all(data.as_slice())
                        .context("Failed to decompress raw activity JSON")?;
                    String::from_utf8(bytes).context("Raw activity JSON is not UTF-8")
                })
                .transpose()?;
            Ok(HealthRecord::Activity(activity))
        })
        .collect()
}

fn load_sleep_sessions(conn: &Connection) -> Result<Vec<HealthRecord>> {
    let mut stmt = conn.prepare(
        "SELECT calendar_date, sleep_start, sleep_end, total_sleep_seconds, deep_sleep_seconds,
                light_sleep_seconds, rem_sleep_seconds, awake_seconds, sleep_score,
                avg_respiration, avg_spo2, lowest_spo2, restless_moments
         FROM sleep_sessions ORDER BY calendar_date ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let date: String = row.get(0)?;
            let start: Option<String> = row.get(1)?;
            let end: Option<String> = row.get(2)?;
            let session = SleepSession {
                calendar_date: NaiveDate::MIN,
                sleep_start: None,
                sleep_end: None,
                total_sleep_seconds: row.get(3)?,
                deep_sleep_seconds: row.get(4)?,
                light_sleep_seconds: row.get(5)?,
                rem_sleep_seconds: row.get(6)?,
                awake_seconds: row.get(7)?,
                sleep_score: row.get(8)?,
                avg_respiration: row.get(9)?,
                avg_spo2: row.get(10)?,
                lowest_spo2: row.get(11)?,
                restless_moments: row.get(12)?,
            };
            Ok((date, start, end, session))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(date, start, end, mut session)| {
            session.calendar_date = parse_date(&date)?;
            session.sleep_start = start.as_deref().map(parse_ts).transpose()?;
            session.sleep_end = end.as_deref().map(parse_ts).transpose()?;
            Ok(HealthRecord::Sleep(session))
        })
        .collect()
}

fn load_heart_rates(conn: &Connection) -> Result<Vec<HealthRecord>> {
    let mut stmt =
        conn.prepare("SELECT timestamp_ms, bpm FROM heart_rate_samples ORDER BY timestamp_ms ASC")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i32>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(ms, bpm)| {
            Ok(HealthRecord::HeartRate(HeartRateSample {
                timestamp: from_millis(ms)?,
                bpm,
            }))
        })
        .collect()
}

fn load_stress_samples(conn: &Connection) -> Result<Vec<HealthRecord>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp_ms, stress_level, body_battery
         FROM stress_samples ORDER BY timestamp_ms ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i32>>(1)?,
                row.get::<_, Option<i32>>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(ms, stress_level, body_battery)| {
            Ok(HealthRecord::Stress(StressSample {
                timestamp: from_millis(ms)?,
                stress_level,
                body_battery,
            }))
        })
        .collect()
}

/// `(timestamp_ms, value)` rows of a single-valued series, oldest first
fn load_series(conn: &Connection, sql: &str) -> Result<Vec<(DateTime<Utc>, f64)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(ms, value)| Ok((from_millis(ms)?, value)))
        .collect()
}

fn load_hrv_readings(conn: &Connection) -> Result<Vec<HealthRecord>> {
    let rows = load_series(
        conn,
        "SELECT timestamp_ms, hrv_ms FROM hrv_readings ORDER BY timestamp_ms ASC",
    )?;
    Ok(rows
        .into_iter()
        .map(|(timestamp, hrv_ms)| HealthRecord::Hrv(HrvReading { timestamp, hrv_ms }))
        .collect())
}

fn load_respiration_samples(conn: &Connection) -> Result<Vec<HealthRecord>> {
    let rows = load_series(
        conn,
        "SELECT timestamp_ms, breaths_per_minute FROM respiration_samples
         ORDER BY timestamp_ms ASC",
    )?;
    Ok(rows
        .into_iter()
        .map(|(timestamp, breaths_per_minute)| {
            HealthRecord::Respiration(RespirationSample {
                timestamp,
                breaths_per_minute,
            })
        })
        .collect())
}

fn load_body_composition(conn: &Connection) -> Result<Vec<HealthRecord>> {
    let mut stmt = conn.prepare(
        "SELECT measured_at_ms, weight_kg, bmi, body_fat_percentage, body_water_percentage,
                bone_mass_kg, muscle_mass_kg, source
         FROM body_composition ORDER BY measured_at_ms ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let ms: i64 = row.get(0)?;
            let reading = BodyCompositionReading {
                measured_at: DateTime::<Utc>::MIN_UTC,
                weight_kg: row.get(1)?,
                bmi: row.get(2)?,
                body_fat_percentage: row.get(3)?,
                body_water_percentage: row.get(4)?,
                bone_mass_kg: row.get(5)?,
                muscle_mass_kg: row.get(6)?,
                source: row.get(7)?,
            };
            Ok((ms, reading))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(ms, mut reading)| {
            reading.measured_at = from_millis(ms)?;
            Ok(HealthRecord::BodyComposition(reading))
        })
        .collect()
}

fn load_track_points(conn: &Connection) -> Result<Vec<HealthRecord>> {
    let mut stmt = conn.prepare(
        "SELECT activity_id, sequence, timestamp_ms, latitude, longitude, altitude_meters
         FROM track_points ORDER BY activity_id ASC, sequence ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, Option<f64>>(5)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(
            |(activity_id, sequence, timestamp_ms, latitude, longitude, altitude_meters)| {
                Ok(HealthRecord::TrackPoint(TrackPoint {
                    activity_id: ActivityId(activity_id),
                    sequence,
                    timestamp: timestamp_ms.map(from_millis).transpose()?,
                    latitude,
                    longitude,
                    altitude_meters,
                }))
            },
        )
        .collect()
}
