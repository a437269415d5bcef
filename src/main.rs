use anyhow::{Context, Result};
use capscraper::{config::Settings, pipeline, RunError, RunSummary, StopSignal, Store};
use chrono::Local;
use clap::Parser;
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Import the operationally-available capacity posting into SQLite.
#[derive(Parser, Debug)]
#[command(name = "capscraper", version)]
struct Cli {
    /// YAML settings file; flags below override it.
    #[arg(long, env = "CAPSCRAPER_CONFIG")]
    config: Option<PathBuf>,

    /// Days back from today to import (yesterday is the newest).
    #[arg(long, env = "CAPSCRAPER_DAYS")]
    days: Option<u32>,

    /// SQLite database file.
    #[arg(long, env = "CAPSCRAPER_DATABASE")]
    database: Option<PathBuf>,

    /// Base URL of the posting.
    #[arg(long, env = "CAPSCRAPER_FEED_URL")]
    feed_url: Option<String>,

    /// Import days again even if already loaded.
    #[arg(long)]
    reimport: bool,

    /// Days processed concurrently.
    #[arg(long, env = "CAPSCRAPER_WORKERS")]
    workers: Option<usize>,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut s = match &self.config {
            Some(path) => Settings::from_yaml_file(path)?,
            None => Settings::default(),
        };
        if let Some(days) = self.days {
            s.days = days;
        }
        if let Some(db) = &self.database {
            s.database = db.clone();
        }
        if let Some(url) = &self.feed_url {
            s.feed_url = url.clone();
        }
        if let Some(workers) = self.workers {
            s.workers = workers;
        }
        s.reimport |= self.reimport;
        s.validate()?;
        Ok(s)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,capscraper=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    // ─── 2) settings, store, feed ────────────────────────────────────
    let settings = cli.settings()?;
    info!(days = settings.days, db = %settings.database.display(), "startup");

    let store = Store::open(&settings.database)
        .with_context(|| format!("opening {}", settings.database.display()))?;
    let feed = Arc::new(settings.http_feed()?);
    let config = settings.pipeline_config(Local::now().date_naive());

    // ─── 3) ctrl-c stops new days from starting ──────────────────────
    let stop = StopSignal::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing days in flight");
                stop.stop();
            }
        });
    }

    // ─── 4) run & report ─────────────────────────────────────────────
    match pipeline::run(&config, feed, store, stop).await {
        Ok(summary) => report(cli, &summary),
        Err(RunError::NoDaySucceeded { summary }) => {
            report(cli, &summary)?;
            Err(RunError::NoDaySucceeded { summary }.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn report(cli: &Cli, summary: &RunSummary) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    for f in &summary.failures {
        warn!(date = %f.date, stage = f.stage, reason = %f.reason, "day failed");
    }
    info!(
        completed = summary.completed.len(),
        failed = summary.failures.len(),
        skipped = summary.skipped.len(),
        rejected = summary.rejected,
        loaded = summary.loaded(),
        stopped = summary.stopped,
        "summary"
    );
    Ok(())
}
