use crate::attributes::parse_attributes;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::UsageHistory;
use crate::source::SnapshotSource;
use crate::storage::Storage;
use chrono::{DateTime, Local};
use reqwest::Client;
use serde_json::Value;
use std::time::Instant;
use tracing::info;

pub struct SourceTestReport {
    pub status_code: Option<u16>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// Records in the fetched snapshot.
    pub fetched: UsageHistory,
    /// Everything stored after the merge.
    pub history: UsageHistory,
    pub trimmed: usize,
    pub fetched_at: DateTime<Local>,
}

/// Clones share one HTTP connection pool.
#[derive(Clone)]
pub struct MeterService {
    client: Client,
}

impl MeterService {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    pub async fn test_source_connection(
        &self,
        source: &dyn SnapshotSource,
    ) -> Result<SourceTestReport, AppError> {
        let started = Instant::now();
        let status_code = source.test_connection(&self.client).await?;
        Ok(SourceTestReport {
            status_code,
            duration_ms: started.elapsed().as_millis(),
        })
    }

    pub async fn fetch_attributes(&self, source: &dyn SnapshotSource) -> Result<Value, AppError> {
        source.fetch_attributes(&self.client).await
    }

    /// Merges a fetched attribute blob into storage and returns the stored history.
    pub fn ingest(
        &self,
        cfg: &AppConfig,
        attrs: &Value,
        storage: &mut Storage,
    ) -> Result<RefreshReport, AppError> {
        let fetched = parse_attributes(attrs);
        storage.merge_history(&fetched)?;
        let trimmed = storage.trim(cfg.retention_days)?;
        let history = storage.load_history()?;

        info!(
            fetched = fetched.len(),
            stored = history.len(),
            trimmed,
            "usage history refreshed"
        );

        Ok(RefreshReport {
            fetched,
            history,
            trimmed,
            fetched_at: Local::now(),
        })
    }

    pub async fn refresh(
        &self,
        cfg: &AppConfig,
        source: &dyn SnapshotSource,
        storage: &mut Storage,
    ) -> Result<RefreshReport, AppError> {
        let attrs = self.fetch_attributes(source).await?;
        self.ingest(cfg, &attrs, storage)
    }
}
