// src/store/mod.rs
//! SQLite destination for capacity records.
//!
//! One connection per run, shared behind a mutex. Every day is written inside a
//! single `BEGIN IMMEDIATE` transaction, so a day is either fully visible or
//! not at all, and concurrent day loads never interleave.

pub mod history;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::process::{CapacityRecord, NaturalKey};

pub use history::ImportRecord;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS operational_capacity (
    report_date        TEXT NOT NULL,
    location_id        TEXT NOT NULL CHECK (location_id <> ''),
    capacity_type      TEXT NOT NULL CHECK (capacity_type <> ''),
    measurement        REAL,
    unit               TEXT NOT NULL,
    post_date          TEXT,
    zone               TEXT,
    location_name      TEXT,
    location_purpose   TEXT,
    flow_indicator     TEXT,
    design_capacity    REAL,
    operating_capacity REAL,
    scheduled_quantity REAL,
    interruptible      TEXT,
    auth_overrun_ind   TEXT,
    nom_cap_exceed_ind TEXT,
    all_qty_avail      TEXT,
    qty_reason         TEXT,
    import_id          INTEGER NOT NULL,
    PRIMARY KEY (report_date, location_id, capacity_type)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS import_history (
    report_date TEXT PRIMARY KEY,
    import_id   INTEGER NOT NULL,
    rows_loaded INTEGER NOT NULL,
    imported_at TEXT NOT NULL
) WITHOUT ROWID;
"#;

// ON CONFLICT only covers the key; CHECK and NOT NULL violations still raise.
const INSERT_SQL: &str = "
INSERT INTO operational_capacity (
    report_date, location_id, capacity_type, measurement, unit, post_date,
    zone, location_name, location_purpose, flow_indicator,
    design_capacity, operating_capacity, scheduled_quantity,
    interruptible, auth_overrun_ind, nom_cap_exceed_ind, all_qty_avail, qty_reason,
    import_id
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
ON CONFLICT (report_date, location_id, capacity_type) DO NOTHING";

const UPDATE_SQL: &str = "
UPDATE operational_capacity SET
    measurement = ?4, unit = ?5, post_date = ?6,
    zone = ?7, location_name = ?8, location_purpose = ?9, flow_indicator = ?10,
    design_capacity = ?11, operating_capacity = ?12, scheduled_quantity = ?13,
    interruptible = ?14, auth_overrun_ind = ?15, nom_cap_exceed_ind = ?16,
    all_qty_avail = ?17, qty_reason = ?18, import_id = ?19
WHERE report_date = ?1 AND location_id = ?2 AND capacity_type = ?3";

const SELECT_SQL: &str = "
SELECT report_date, location_id, capacity_type, measurement, unit, post_date,
       zone, location_name, location_purpose, flow_indicator,
       design_capacity, operating_capacity, scheduled_quantity,
       interruptible, auth_overrun_ind, nom_cap_exceed_ind, all_qty_avail, qty_reason
FROM operational_capacity
WHERE report_date = ?1 AND location_id = ?2 AND capacity_type = ?3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// What one day's load did to the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub inserted: u64,
    pub updated: u64,
    /// Records of the day that the new import no longer contains.
    pub removed: u64,
}

impl LoadStats {
    pub fn loaded(&self) -> u64 {
        self.inserted + self.updated
    }
}

/// Handle on the destination database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(journal_mode = %mode, "WAL mode not active");
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), rows = store.count()?, "store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, LoadError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LoadError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LoadError> {
        self.conn.lock().map_err(|_| LoadError::Poisoned)
    }

    /// Start a write transaction. It holds the store's lock until it is
    /// committed, rolled back or dropped (dropping rolls back).
    pub fn begin(&self) -> Result<Batch<'_>, LoadError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let mut batch = Batch {
            conn,
            import_id: 0,
            open: true,
        };
        batch.import_id = batch.conn.query_row(
            "SELECT COALESCE(MAX(import_id), 0) + 1 FROM import_history",
            [],
            |r| r.get(0),
        )?;
        Ok(batch)
    }

    /// Upsert one day's records atomically and mark the day complete.
    #[tracing::instrument(level = "info", skip(self, records), fields(records = records.len()))]
    pub fn load_day(
        &self,
        day: NaiveDate,
        records: &[CapacityRecord],
    ) -> Result<LoadStats, LoadError> {
        let mut batch = self.begin()?;
        let mut stats = LoadStats::default();
        for rec in records {
            match batch.upsert(rec)? {
                UpsertOutcome::Inserted => stats.inserted += 1,
                UpsertOutcome::Updated => stats.updated += 1,
            }
        }
        // rows the feed dated elsewhere are stored under their own date
        let for_day = records.iter().filter(|r| r.report_date == day).count();
        stats.removed = batch.seal_day(day, for_day as u64)?;
        batch.commit()?;
        info!(
            inserted = stats.inserted,
            updated = stats.updated,
            removed = stats.removed,
            "day committed"
        );
        Ok(stats)
    }

    pub fn count(&self) -> Result<u64, LoadError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM operational_capacity", [], |r| {
            r.get(0)
        })?;
        Ok(n as u64)
    }

    pub fn count_for(&self, day: NaiveDate) -> Result<u64, LoadError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM operational_capacity WHERE report_date = ?1",
            params![day],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn get(&self, key: &NaturalKey) -> Result<Option<CapacityRecord>, LoadError> {
        let conn = self.lock()?;
        let rec = conn
            .query_row(
                SELECT_SQL,
                params![key.report_date, key.location_id, key.capacity_type],
                record_from_row,
            )
            .optional()?;
        Ok(rec)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CapacityRecord> {
    Ok(CapacityRecord {
        report_date: row.get(0)?,
        location_id: row.get(1)?,
        capacity_type: row.get(2)?,
        measurement: row.get(3)?,
        unit: row.get(4)?,
        post_date: row.get(5)?,
        zone: row.get(6)?,
        location_name: row.get(7)?,
        location_purpose: row.get(8)?,
        flow_indicator: row.get(9)?,
        design_capacity: row.get(10)?,
        operating_capacity: row.get(11)?,
        scheduled_quantity: row.get(12)?,
        interruptible: row.get(13)?,
        auth_overrun_ind: row.get(14)?,
        nom_cap_exceed_ind: row.get(15)?,
        all_qty_avail: row.get(16)?,
        qty_reason: row.get(17)?,
    })
}

/// An open write transaction on the store.
pub struct Batch<'a> {
    conn: MutexGuard<'a, Connection>,
    import_id: i64,
    open: bool,
}

impl Batch<'_> {
    /// Id stamped on every record written through this batch.
    pub fn import_id(&self) -> i64 {
        self.import_id
    }

    /// Insert the record, or overwrite the non-key attributes of the record
    /// already stored under its natural key.
    pub fn upsert(&mut self, rec: &CapacityRecord) -> Result<UpsertOutcome, LoadError> {
        let args = params![
            rec.report_date,
            rec.location_id,
            rec.capacity_type,
            rec.measurement,
            rec.unit,
            rec.post_date,
            rec.zone,
            rec.location_name,
            rec.location_purpose,
            rec.flow_indicator,
            rec.design_capacity,
            rec.operating_capacity,
            rec.scheduled_quantity,
            rec.interruptible,
            rec.auth_overrun_ind,
            rec.nom_cap_exceed_ind,
            rec.all_qty_avail,
            rec.qty_reason,
            self.import_id,
        ];

        if self.conn.prepare_cached(INSERT_SQL)?.execute(args)? == 1 {
            return Ok(UpsertOutcome::Inserted);
        }
        if self.conn.prepare_cached(UPDATE_SQL)?.execute(args)? == 0 {
            return Err(LoadError::Lost {
                key: rec.natural_key().to_string(),
            });
        }
        Ok(UpsertOutcome::Updated)
    }

    pub fn commit(mut self) -> Result<(), LoadError> {
        self.conn.execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), LoadError> {
        self.open = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if self.open {
            debug!(import_id = self.import_id, "rolling back unfinished batch");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback failed");
            }
        }
    }
}
