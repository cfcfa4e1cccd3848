use crate::config::SourceSettings;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

pub mod file;
pub mod home_assistant;

/// Somewhere the usage sensor's attribute blob can be read from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the sensor's attribute object.
    async fn fetch_attributes(&self, client: &Client) -> Result<Value, AppError>;

    async fn test_connection(&self, client: &Client) -> Result<Option<u16>, AppError> {
        self.fetch_attributes(client).await.map(|_| None)
    }
}

/// Accepts either a full entity state (`{"state": .., "attributes": {..}}`)
/// or a bare attribute object.
pub fn attributes_of(body: Value) -> Result<Value, AppError> {
    match body {
        Value::Object(mut map) => match map.remove("attributes") {
            Some(attrs @ Value::Object(_)) => Ok(attrs),
            Some(_) => Err(AppError::Source(
                "entity 'attributes' is not an object".into(),
            )),
            None => Ok(Value::Object(map)),
        },
        other => Err(AppError::Source(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Home Assistant source for the configured entity, using the stored token.
pub fn configured_source(settings: &SourceSettings) -> Result<Box<dyn SnapshotSource>, AppError> {
    let Some(base_url) = settings.base_url.clone() else {
        return Err(AppError::Config(
            "No Home Assistant URL configured. Set source.base_url in config.toml or pass --input."
                .into(),
        ));
    };
    let token = crate::config::get_token()?;
    Ok(Box::new(home_assistant::HomeAssistantSource::new(
        base_url,
        settings.entity_id.clone(),
        token,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attributes_of_unwraps_entity_state() {
        let attrs = attributes_of(json!({
            "entity_id": "sensor.usage",
            "state": "12.5",
            "attributes": {"daily_usage_history": []}
        }))
        .expect("attributes");
        assert!(attrs.get("daily_usage_history").is_some());
        assert!(attrs.get("state").is_none());
    }

    #[test]
    fn attributes_of_accepts_bare_attributes() {
        let attrs = attributes_of(json!({"hourly_usage_history": []})).expect("attributes");
        assert!(attrs.get("hourly_usage_history").is_some());
    }

    #[test]
    fn attributes_of_rejects_non_objects() {
        let err = attributes_of(json!([1, 2])).expect_err("array should be rejected");
        assert!(err.to_string().contains("an array"));
        assert!(attributes_of(json!({"attributes": "x"})).is_err());
    }
}
