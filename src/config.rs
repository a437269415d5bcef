// src/config.rs
//! Run settings: YAML file first, command-line overrides on top.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};
use url::Url;

use crate::fetch::{FeedEndpoint, HttpFeed, RetryPolicy, DEFAULT_FEED_URL};
use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub days: u32,
    pub database: PathBuf,
    pub feed_url: String,
    pub asset: String,
    pub search_type: String,
    pub reimport: bool,
    pub workers: usize,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Whole-fetch budget for one day, retries included.
    pub fetch_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            days: 3,
            database: PathBuf::from("energy_data.db"),
            feed_url: DEFAULT_FEED_URL.to_string(),
            asset: "TW".to_string(),
            search_type: "NOM".to_string(),
            reimport: false,
            workers: 1,
            request_timeout_secs: 30,
            fetch_timeout_secs: 120,
            retry: RetryPolicy::default(),
            user_agent: concat!("capscraper/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Settings {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.multiplier < 1.0 {
            bail!("retry.multiplier must be >= 1.0, got {}", self.retry.multiplier);
        }
        if self.request_timeout_secs == 0 || self.fetch_timeout_secs == 0 {
            bail!("timeouts must be positive");
        }
        self.endpoint()?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<FeedEndpoint> {
        let url = Url::parse(&self.feed_url)
            .with_context(|| format!("invalid feed url {:?}", self.feed_url))?;
        Ok(FeedEndpoint {
            base_url: url,
            asset: self.asset.clone(),
            search_type: self.search_type.clone(),
        })
    }

    pub fn http_feed(&self) -> Result<HttpFeed> {
        let feed = HttpFeed::new(
            self.endpoint()?,
            self.retry.clone(),
            Duration::from_secs(self.request_timeout_secs),
            &self.user_agent,
        )?;
        Ok(feed)
    }

    pub fn pipeline_config(&self, today: NaiveDate) -> PipelineConfig {
        PipelineConfig {
            days: self.days,
            reimport: self.reimport,
            workers: self.workers,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            today,
        }
    }
}
