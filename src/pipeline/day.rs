// src/pipeline/day.rs
//! One gas day through fetch → parse → validate → transform → load.

use chrono::NaiveDate;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::summary::{DayFailure, FailureReason, RejectedRow, RunSummary};
use crate::error::{LoadError, TransformError};
use crate::fetch::FeedSource;
use crate::process::columns::{EFFECTIVE_DATE, POST_DATE};
use crate::process::date_parser::format_gas_day;
use crate::process::{parse, transform, validate};
use crate::store::{LoadStats, Store};

/// Where a day is in its pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayState {
    Pending,
    Fetched,
    Parsed,
    Validated,
    Transformed,
    Loaded,
    Failed(FailureReason),
}

impl DayState {
    pub fn name(&self) -> &'static str {
        match self {
            DayState::Pending => "pending",
            DayState::Fetched => "fetched",
            DayState::Parsed => "parsed",
            DayState::Validated => "validated",
            DayState::Transformed => "transformed",
            DayState::Loaded => "loaded",
            DayState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DayOutcome {
    Loaded(LoadStats),
    Failed(DayFailure),
}

/// Everything one day contributes to the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct DayReport {
    pub day: NaiveDate,
    pub fetched: u64,
    pub accepted: u64,
    pub rejections: Vec<RejectedRow>,
    pub outcome: DayOutcome,
}

impl DayReport {
    pub fn fold_into(self, summary: &mut RunSummary) {
        summary.fetched += self.fetched;
        summary.accepted += self.accepted;
        summary.rejected += self.rejections.len() as u64;
        summary.rejections.extend(self.rejections);
        match self.outcome {
            DayOutcome::Loaded(stats) => {
                summary.add_load(&stats);
                summary.completed.push(self.day);
            }
            DayOutcome::Failed(failure) => summary.failures.push(failure),
        }
    }
}

/// Shared, read-only inputs of every day in a run.
pub(crate) struct DayContext {
    pub source: Arc<dyn FeedSource>,
    pub store: Store,
    pub fetch_timeout: Duration,
    /// Stamped as `Post Date` on every row.
    pub post_date: NaiveDate,
}

struct DayRun {
    day: NaiveDate,
    state: DayState,
    fetched: u64,
    accepted: u64,
    rejections: Vec<RejectedRow>,
}

impl DayRun {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            state: DayState::Pending,
            fetched: 0,
            accepted: 0,
            rejections: Vec::new(),
        }
    }

    fn advance(&mut self, next: DayState) {
        debug!(day = %self.day, from = self.state.name(), to = next.name(), "day advanced");
        self.state = next;
    }

    fn fail(mut self, reason: FailureReason) -> DayReport {
        warn!(day = %self.day, stage = self.state.name(), %reason, "day failed");
        let failure = DayFailure {
            date: self.day,
            stage: self.state.name(),
            reason: reason.clone(),
        };
        self.advance(DayState::Failed(reason));
        self.finish(DayOutcome::Failed(failure))
    }

    fn finish(self, outcome: DayOutcome) -> DayReport {
        DayReport {
            day: self.day,
            fetched: self.fetched,
            accepted: self.accepted,
            rejections: self.rejections,
            outcome,
        }
    }
}

/// Run one day to `Loaded` or `Failed`.
///
/// Only a [`TransformError`] escapes; every other problem becomes a failed day.
#[tracing::instrument(level = "info", skip(ctx, day), fields(day = %day))]
pub(crate) async fn process_day(
    ctx: &DayContext,
    day: NaiveDate,
) -> Result<DayReport, TransformError> {
    let mut run = DayRun::new(day);

    let body = match timeout(ctx.fetch_timeout, ctx.source.fetch(day)).await {
        Err(_) => return Ok(run.fail(FailureReason::Timeout)),
        Ok(Err(e)) if e.is_timeout() => return Ok(run.fail(FailureReason::Timeout)),
        Ok(Err(e)) => return Ok(run.fail(FailureReason::Fetch(e.to_string()))),
        Ok(Ok(body)) => body,
    };
    run.advance(DayState::Fetched);

    let feed = match parse(body) {
        Ok(feed) => feed,
        Err(e) => return Ok(run.fail(FailureReason::Parse(e.to_string()))),
    };
    run.advance(DayState::Parsed);

    let post_date = format_gas_day(ctx.post_date);
    let gas_day = format_gas_day(day);
    let mut accepted = Vec::with_capacity(feed.len());
    for mut row in feed.rows() {
        run.fetched += 1;
        row.stamp(POST_DATE, post_date.as_str());
        row.stamp_if_blank(EFFECTIVE_DATE, gas_day.as_str());
        let validated = validate(row);
        if validated.is_accepted() {
            accepted.push(validated);
        } else if let Some(r) = validated.rejection() {
            run.rejections.push(RejectedRow {
                date: day,
                line: validated.row.line,
                reason: r.reason,
                detail: r.detail.clone(),
            });
        }
    }
    run.accepted = accepted.len() as u64;
    run.advance(DayState::Validated);

    let records = accepted
        .iter()
        .map(transform)
        .collect::<Result<Vec<_>, _>>()?;
    run.advance(DayState::Transformed);

    // an empty import would wipe whatever the day already holds
    if records.is_empty() {
        return Ok(run.fail(FailureReason::Empty));
    }

    let store = ctx.store.clone();
    let loaded = tokio::task::spawn_blocking(move || store.load_day(day, &records))
        .await
        .unwrap_or_else(|e| Err(LoadError::Task(e.to_string())));
    match loaded {
        Ok(stats) => {
            run.advance(DayState::Loaded);
            info!(
                fetched = run.fetched,
                accepted = run.accepted,
                rejected = run.rejections.len(),
                inserted = stats.inserted,
                updated = stats.updated,
                "day loaded"
            );
            Ok(run.finish(DayOutcome::Loaded(stats)))
        }
        Err(e) => Ok(run.fail(FailureReason::Load(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct Canned(Result<String, fn() -> FetchError>);

    #[async_trait]
    impl FeedSource for Canned {
        async fn fetch(&self, _day: NaiveDate) -> Result<Bytes, FetchError> {
            match &self.0 {
                Ok(body) => Ok(Bytes::from(body.clone())),
                Err(make) => Err(make()),
            }
        }
    }

    fn ctx(source: Canned) -> DayContext {
        DayContext {
            source: Arc::new(source),
            store: Store::open_in_memory().unwrap(),
            fetch_timeout: Duration::from_secs(5),
            post_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    const HEADER: &str = "Loc,Loc Zn,Loc Name,Loc Purp Desc,Loc/QTI,Flow Ind,DC,OPC,TSQ,OAC,IT,Auth Overrun Ind,Nom Cap Exceed Ind,All Qty Avail,Qty Reason";

    fn failure(report: &DayReport) -> &DayFailure {
        match &report.outcome {
            DayOutcome::Failed(f) => f,
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stamped_dates_complete_the_row() {
        let body = format!("{HEADER}\n100,WEST,A,Receipt,RPQ,R,10,9,8,7,N,N,N,Y,\n");
        let ctx = ctx(Canned(Ok(body)));
        let report = process_day(&ctx, day()).await.unwrap();
        assert!(matches!(report.outcome, DayOutcome::Loaded(LoadStats { inserted: 1, .. })));
        assert!(ctx.store.is_complete(day()).unwrap());
        assert_eq!(ctx.store.count_for(day()).unwrap(), 1);
    }

    #[tokio::test]
    async fn effective_date_marked_not_available_takes_the_gas_day() {
        let body = format!(
            "Effective Date,{HEADER}\nN/A,100,WEST,A,Receipt,RPQ,R,10,9,8,7,N,N,N,Y,\n"
        );
        let ctx = ctx(Canned(Ok(body)));
        let report = process_day(&ctx, day()).await.unwrap();
        assert!(report.rejections.is_empty(), "{:?}", report.rejections);
        assert!(matches!(report.outcome, DayOutcome::Loaded(LoadStats { inserted: 1, .. })));
        assert_eq!(ctx.store.count_for(day()).unwrap(), 1);
    }

    #[tokio::test]
    async fn fetch_errors_fail_the_day_at_pending() {
        let ctx = ctx(Canned(Err(|| FetchError::Status {
            status: 404,
            url: "http://x".into(),
            attempts: 1,
        })));
        let report = process_day(&ctx, day()).await.unwrap();
        let f = failure(&report);
        assert_eq!(f.stage, "pending");
        assert!(matches!(f.reason, FailureReason::Fetch(_)));
    }

    #[tokio::test]
    async fn transport_timeouts_are_reported_as_timeouts() {
        let ctx = ctx(Canned(Err(|| FetchError::Timeout { attempts: 3 })));
        let report = process_day(&ctx, day()).await.unwrap();
        assert_eq!(failure(&report).reason, FailureReason::Timeout);
    }

    #[tokio::test]
    async fn broken_csv_fails_at_fetched() {
        let ctx = ctx(Canned(Ok("Loc,OAC\n\"1,2\n".into())));
        let report = process_day(&ctx, day()).await.unwrap();
        let f = failure(&report);
        assert_eq!(f.stage, "fetched");
        assert!(matches!(f.reason, FailureReason::Parse(_)));
        assert_eq!(report.fetched, 0);
    }

    #[tokio::test]
    async fn all_rejected_day_leaves_store_alone() {
        let ctx = ctx(Canned(Ok("Loc,OAC\n1,2\n3,4\n".into())));
        let report = process_day(&ctx, day()).await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.rejections.len(), 2);
        assert_eq!(failure(&report).reason, FailureReason::Empty);
        assert!(!ctx.store.is_complete(day()).unwrap());
    }
}
