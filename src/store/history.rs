// src/store/history.rs
//! Which gas days have been imported, and by which import.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeSet;

use super::{Batch, Store};
use crate::error::LoadError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRecord {
    pub report_date: NaiveDate,
    pub import_id: i64,
    pub rows_loaded: u64,
    pub imported_at: DateTime<Utc>,
}

impl Store {
    /// Returns `true` if a successful import of `day` has been committed.
    pub fn is_complete(&self, day: NaiveDate) -> Result<bool, LoadError> {
        Ok(self.last_import(day)?.is_some())
    }

    pub fn last_import(&self, day: NaiveDate) -> Result<Option<ImportRecord>, LoadError> {
        let conn = self.lock()?;
        let rec = conn
            .query_row(
                "SELECT report_date, import_id, rows_loaded, imported_at
                 FROM import_history WHERE report_date = ?1",
                params![day],
                |r| {
                    Ok(ImportRecord {
                        report_date: r.get(0)?,
                        import_id: r.get(1)?,
                        rows_loaded: r.get::<_, i64>(2)? as u64,
                        imported_at: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(rec)
    }

    /// Completed days within `from..=to`.
    pub fn completed_days(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>, LoadError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT report_date FROM import_history
             WHERE report_date BETWEEN ?1 AND ?2",
        )?;
        let days = stmt
            .query_map(params![from, to], |r| r.get::<_, NaiveDate>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(days)
    }
}

impl Batch<'_> {
    /// Finish a day inside this transaction: drop the day's records that this
    /// import did not write and record the import. Returns the number dropped.
    pub fn seal_day(&mut self, day: NaiveDate, rows_loaded: u64) -> Result<u64, LoadError> {
        let removed = self.conn.execute(
            "DELETE FROM operational_capacity WHERE report_date = ?1 AND import_id <> ?2",
            params![day, self.import_id],
        )?;
        self.conn.execute(
            "INSERT INTO import_history (report_date, import_id, rows_loaded, imported_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (report_date) DO UPDATE SET
                 import_id = excluded.import_id,
                 rows_loaded = excluded.rows_loaded,
                 imported_at = excluded.imported_at",
            params![day, self.import_id, rows_loaded as i64, Utc::now()],
        )?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::record;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, d).unwrap()
    }

    #[test]
    fn days_become_complete_on_commit_only() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.is_complete(day(1)).unwrap());

        let mut batch = store.begin().unwrap();
        batch.seal_day(day(1), 0).unwrap();
        batch.rollback().unwrap();
        assert!(!store.is_complete(day(1)).unwrap());

        store.load_day(day(1), &[]).unwrap();
        assert!(store.is_complete(day(1)).unwrap());
    }

    #[test]
    fn rows_loaded_counts_only_the_sealed_day() {
        let store = Store::open_in_memory().unwrap();
        store
            .load_day(
                day(5),
                &[
                    record(day(5), "1", "RPQ", None),
                    record(day(5), "2", "RPQ", None),
                    record(day(6), "1", "RPQ", None),
                ],
            )
            .unwrap();
        let rec = store.last_import(day(5)).unwrap().unwrap();
        assert_eq!(rec.rows_loaded, 2);
        assert_eq!(rec.rows_loaded, store.count_for(day(5)).unwrap());
        assert!(!store.is_complete(day(6)).unwrap());
    }

    #[test]
    fn later_imports_replace_the_history_entry() {
        let store = Store::open_in_memory().unwrap();
        store
            .load_day(day(2), &[record(day(2), "1", "RPQ", None)])
            .unwrap();
        let first = store.last_import(day(2)).unwrap().unwrap();
        store.load_day(day(3), &[]).unwrap();
        store
            .load_day(
                day(2),
                &[
                    record(day(2), "1", "RPQ", None),
                    record(day(2), "2", "RPQ", None),
                ],
            )
            .unwrap();
        let second = store.last_import(day(2)).unwrap().unwrap();

        assert!(second.import_id > first.import_id);
        assert_eq!(second.rows_loaded, 2);
    }

    #[test]
    fn completed_days_is_range_bounded() {
        let store = Store::open_in_memory().unwrap();
        for d in [1, 4, 9] {
            store.load_day(day(d), &[]).unwrap();
        }
        let days = store.completed_days(day(2), day(9)).unwrap();
        assert_eq!(days.into_iter().collect::<Vec<_>>(), vec![day(4), day(9)]);
    }
}
