use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use crate::process::RejectReason;
use crate::store::LoadStats;

/// Why a day did not load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    /// The posting had no row that passed validation.
    Empty,
    Fetch(String),
    Parse(String),
    Load(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => f.write_str("timeout"),
            FailureReason::Empty => f.write_str("no acceptable rows"),
            FailureReason::Fetch(m) => write!(f, "fetch: {m}"),
            FailureReason::Parse(m) => write!(f, "parse: {m}"),
            FailureReason::Load(m) => write!(f, "load: {m}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayFailure {
    pub date: NaiveDate,
    /// Last stage the day reached before failing.
    pub stage: &'static str,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub date: NaiveDate,
    pub line: u64,
    pub reason: RejectReason,
    pub detail: String,
}

/// Outcome of one pipeline run across every day attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub fetched: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub inserted: u64,
    pub updated: u64,
    pub removed: u64,
    /// Days that loaded, in the order they finished.
    pub completed: Vec<NaiveDate>,
    pub failures: Vec<DayFailure>,
    pub rejections: Vec<RejectedRow>,
    /// Days left out because they were already imported.
    pub skipped: Vec<NaiveDate>,
    /// A stop was requested before every day could start.
    pub stopped: bool,
}

impl RunSummary {
    pub fn loaded(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn days_attempted(&self) -> usize {
        self.completed.len() + self.failures.len()
    }

    pub fn failure_for(&self, date: NaiveDate) -> Option<&DayFailure> {
        self.failures.iter().find(|f| f.date == date)
    }

    pub(crate) fn add_load(&mut self, stats: &LoadStats) {
        self.inserted += stats.inserted;
        self.updated += stats.updated;
        self.removed += stats.removed;
    }

    pub fn rejections_by_reason(&self, reason: RejectReason) -> usize {
        self.rejections.iter().filter(|r| r.reason == reason).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_serializes_for_reporting() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let summary = RunSummary {
            fetched: 12,
            accepted: 10,
            rejected: 2,
            inserted: 10,
            failures: vec![DayFailure {
                date,
                stage: "pending",
                reason: FailureReason::Timeout,
            }],
            rejections: vec![RejectedRow {
                date,
                line: 4,
                reason: RejectReason::WrongType,
                detail: "`OAC` is not a number: \"x\"".into(),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["failures"][0]["reason"]["kind"], "timeout");
        assert_eq!(json["rejections"][0]["reason"], "wrong-type");
        assert_eq!(json["failures"][0]["date"], "2026-10-16");
        assert_eq!(summary.loaded(), 10);
        assert_eq!(summary.days_attempted(), 1);
    }

    #[test]
    fn failure_reasons_read_naturally() {
        assert_eq!(FailureReason::Timeout.to_string(), "timeout");
        assert_eq!(
            FailureReason::Load("disk full".into()).to_string(),
            "load: disk full"
        );
    }
}
