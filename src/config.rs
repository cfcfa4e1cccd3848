use crate::error::AppError;
use ::config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "energy-meter";
pub const ENV_PREFIX: &str = "ENERGY_METER";
const TOKEN_ENTRY: &str = "source:token";

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("ENERGY_METER_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("nz", "energy-meter", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".energy-meter"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Regional locale used for date labels, e.g. "en-NZ".
    pub locale: String,
    pub page_size: usize,
    pub monthly_min_slots: usize,
    pub refresh_seconds: u64,
    pub retention_days: u32,
    pub source: SourceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceSettings {
    /// Home Assistant base URL, e.g. "http://homeassistant.local:8123".
    pub base_url: Option<String>,
    pub entity_id: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            entity_id: "sensor.mercury_nz_energy_usage".into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            locale: "en-NZ".into(),
            page_size: crate::window::DEFAULT_PAGE_SIZE,
            monthly_min_slots: crate::window::MONTHLY_MIN_SLOTS,
            refresh_seconds: 300,
            retention_days: 180,
            source: SourceSettings::default(),
        }
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("data"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn db_path() -> Result<PathBuf, AppError> {
    Ok(data_dir()?.join("history.sqlite"))
}

pub fn log_path() -> Result<PathBuf, AppError> {
    Ok(data_dir()?.join("energy-meter.log"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(data_dir()?)?;
    Ok(())
}

fn normalize_config(config: &mut AppConfig) -> bool {
    let mut changed = false;

    let locale = config.locale.trim();
    let locale = if locale.is_empty() { "en-NZ" } else { locale }.to_string();
    if locale != config.locale {
        config.locale = locale;
        changed = true;
    }

    if config.page_size == 0 {
        config.page_size = 1;
        changed = true;
    }
    if config.monthly_min_slots == 0 {
        config.monthly_min_slots = 1;
        changed = true;
    }

    let entity = config.source.entity_id.trim().to_string();
    if entity != config.source.entity_id {
        config.source.entity_id = entity;
        changed = true;
    }

    let base_url = config
        .source
        .base_url
        .as_deref()
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty());
    if base_url != config.source.base_url {
        config.source.base_url = base_url;
        changed = true;
    }

    changed
}

/// Reads `config.toml` with `ENERGY_METER_*` environment overrides on top,
/// e.g. `ENERGY_METER_PAGE_SIZE=7` or `ENERGY_METER_SOURCE__ENTITY_ID=...`.
pub fn load_config() -> Result<AppConfig, AppError> {
    let path = config_path()?;
    load_config_from(&path)
}

fn load_config_from(path: &Path) -> Result<AppConfig, AppError> {
    let settings = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let mut parsed: AppConfig = settings.try_deserialize()?;

    // Persist normalized values so the file matches what is in effect.
    if normalize_config(&mut parsed) && path.exists() {
        let raw = toml::to_string_pretty(&parsed)?;
        fs::write(path, raw)?;
    }

    Ok(parsed)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

fn token_entry() -> Result<keyring::Entry, AppError> {
    Ok(keyring::Entry::new(SERVICE_NAME, TOKEN_ENTRY)?)
}

pub fn set_token(token: &str) -> Result<(), AppError> {
    token_entry()?.set_password(token.trim())?;
    Ok(())
}

pub fn delete_token() -> Result<(), AppError> {
    match token_entry()?.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(AppError::Keyring(e)),
    }
}

pub fn has_token() -> Result<bool, AppError> {
    match token_entry()?.get_password() {
        Ok(v) => Ok(!v.is_empty()),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => Err(AppError::Keyring(e)),
    }
}

pub fn get_token() -> Result<String, AppError> {
    if let Ok(value) = token_entry()?.get_password() {
        if !value.is_empty() {
            return Ok(value);
        }
    }

    if let Ok(value) = std::env::var(format!("{ENV_PREFIX}_TOKEN")) {
        if !value.is_empty() {
            return Ok(value);
        }
    }

    Err(AppError::Config(format!(
        "No Home Assistant token found. Run `energy-meter set-token` or set {ENV_PREFIX}_TOKEN."
    )))
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !cfg_path.exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}
