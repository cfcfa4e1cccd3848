use crate::error::AppError;
use crate::source::{attributes_of, SnapshotSource};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// A saved entity state or attribute dump on disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Result<Value, AppError> {
        let raw = std::fs::read_to_string(&self.path)?;
        let body: Value = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), bytes = raw.len(), "read snapshot file");
        attributes_of(body)
    }
}

#[async_trait]
impl SnapshotSource for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn fetch_attributes(&self, _client: &Client) -> Result<Value, AppError> {
        self.read()
    }
}
