// src/pipeline/mod.rs
//! Runs the day window through the pipeline and folds the results into a
//! [`RunSummary`].

pub mod day;
pub mod summary;

use chrono::{Days, Local, NaiveDate};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::error::{RunError, TransformError};
use crate::fetch::FeedSource;
use crate::store::Store;
use day::{process_day, DayContext, DayReport};
pub use day::{DayOutcome, DayState};
pub use summary::{DayFailure, FailureReason, RejectedRow, RunSummary};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How many days back from `today` to import.
    pub days: u32,
    /// Import days again even if they already completed.
    pub reimport: bool,
    /// Days processed at once.
    pub workers: usize,
    /// Overall budget for one day's fetch, retries included.
    pub fetch_timeout: Duration,
    pub today: NaiveDate,
}

impl PipelineConfig {
    pub fn new(days: u32) -> Self {
        Self {
            days,
            reimport: false,
            workers: 1,
            fetch_timeout: Duration::from_secs(120),
            today: Local::now().date_naive(),
        }
    }
}

/// `today - days ..= today - 1`, oldest first.
pub fn day_window(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (1..=u64::from(days))
        .rev()
        .filter_map(|n| today.checked_sub_days(Days::new(n)))
        .collect()
}

/// Cooperative cancellation. Checked before each day starts; a day already
/// under way runs to `Loaded` or `Failed`.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Import every day of the window.
///
/// A failed day never stops the others. The run itself fails only when the
/// store cannot be read, when a transform contract is broken, or when days
/// were attempted and none of them loaded.
pub async fn run(
    config: &PipelineConfig,
    source: Arc<dyn FeedSource>,
    store: Store,
    stop: StopSignal,
) -> Result<RunSummary, RunError> {
    let window = day_window(config.today, config.days);
    let mut summary = RunSummary::default();
    let (Some(&first), Some(&last)) = (window.first(), window.last()) else {
        info!("empty day window, nothing to do");
        return Ok(summary);
    };

    let done = if config.reimport {
        Default::default()
    } else {
        store.completed_days(first, last)?
    };
    let (skipped, pending): (Vec<_>, Vec<_>) =
        window.into_iter().partition(|d| done.contains(d));
    if !skipped.is_empty() {
        info!(skipped = skipped.len(), "days already imported");
    }
    summary.skipped = skipped;
    info!(
        from = %first,
        to = %last,
        pending = pending.len(),
        workers = config.workers,
        "starting run"
    );

    let ctx = Arc::new(DayContext {
        source,
        store,
        fetch_timeout: config.fetch_timeout,
        post_date: config.today,
    });
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let halt = StopSignal::new();
    let (tx, mut rx) =
        mpsc::channel::<(NaiveDate, Result<DayReport, TransformError>)>(pending.len().max(1));

    let mut handles = Vec::with_capacity(pending.len());
    for day in pending {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        if stop.is_stopped() {
            warn!(next = %day, "stop requested, not starting remaining days");
            summary.stopped = true;
            break;
        }
        if halt.is_stopped() {
            break;
        }
        let ctx = ctx.clone();
        let tx = tx.clone();
        let halt = halt.clone();
        handles.push(tokio::spawn(async move {
            let result = process_day(&ctx, day).await;
            if result.is_err() {
                halt.stop();
            }
            drop(permit);
            let _ = tx.send((day, result)).await;
        }));
    }
    drop(tx);

    let mut fatal = None;
    while let Some((day, result)) = rx.recv().await {
        match result {
            Ok(report) => report.fold_into(&mut summary),
            Err(e) => {
                error!(%day, error = %e, "transform contract violated, halting run");
                fatal.get_or_insert((day, e));
            }
        }
    }
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "day task panicked");
        }
    }

    if let Some((day, source)) = fatal {
        return Err(RunError::Transform { day, source });
    }

    info!(
        completed = summary.completed.len(),
        failed = summary.failures.len(),
        skipped = summary.skipped.len(),
        fetched = summary.fetched,
        accepted = summary.accepted,
        rejected = summary.rejected,
        inserted = summary.inserted,
        updated = summary.updated,
        "run finished"
    );

    if summary.days_attempted() > 0 && summary.completed.is_empty() {
        return Err(RunError::NoDaySucceeded {
            summary: Box::new(summary),
        });
    }
    Ok(summary)
}
