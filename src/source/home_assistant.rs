use crate::error::AppError;
use crate::source::{attributes_of, SnapshotSource};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// Reads the usage sensor through the Home Assistant REST API.
pub struct HomeAssistantSource {
    base: Url,
    entity_id: String,
    token: String,
}

impl HomeAssistantSource {
    pub fn new(base_url: String, entity_id: String, token: String) -> Result<Self, AppError> {
        Ok(Self {
            base: Self::normalize_base(&base_url)?,
            entity_id,
            token,
        })
    }

    /// Base URL with a trailing slash so relative joins keep any sub-path.
    fn normalize_base(raw: &str) -> Result<Url, AppError> {
        let trimmed = raw.trim();
        if trimmed.ends_with('/') {
            Ok(Url::parse(trimmed)?)
        } else {
            Ok(Url::parse(&format!("{trimmed}/"))?)
        }
    }

    fn state_url(&self) -> Result<Url, AppError> {
        Ok(self.base.join(&format!("api/states/{}", self.entity_id))?)
    }

    fn api_url(&self) -> Result<Url, AppError> {
        Ok(self.base.join("api/")?)
    }

    fn status_error(status: reqwest::StatusCode, what: &str) -> AppError {
        match status.as_u16() {
            401 | 403 => {
                AppError::Source("Home Assistant rejected the token (unauthorized).".into())
            }
            404 => AppError::Source(format!("Home Assistant has no {what}.")),
            _ => AppError::Source(format!(
                "Home Assistant request for {what} failed with HTTP status {status}."
            )),
        }
    }
}

#[async_trait]
impl SnapshotSource for HomeAssistantSource {
    fn name(&self) -> &'static str {
        "home-assistant"
    }

    async fn fetch_attributes(&self, client: &Client) -> Result<Value, AppError> {
        let url = self.state_url()?;
        debug!(%url, "fetching entity state");

        let response = client.get(url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), entity = %self.entity_id, "entity fetch failed");
            return Err(Self::status_error(
                status,
                &format!("entity '{}'", self.entity_id),
            ));
        }

        let body: Value = response.json().await?;
        attributes_of(body)
    }

    async fn test_connection(&self, client: &Client) -> Result<Option<u16>, AppError> {
        let response = client
            .get(self.api_url()?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(Some(status.as_u16()));
        }
        Err(Self::status_error(status, "API endpoint"))
    }
}
