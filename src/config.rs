use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::session::Session;
use crate::utils;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEZONE: &str = "Asia/Dhaka";
pub const DEFAULT_DEBOUNCE_MS: u64 = 400;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("refusing to overwrite unreadable config {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub cloudinary_cloud_name: Option<String>,
    pub cloudinary_upload_preset: Option<String>,
    pub timezone: String,
    pub debounce_ms: u64,
    pub log_level: String,
    pub session: Option<Session>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            cloudinary_cloud_name: None,
            cloudinary_upload_preset: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            session: None,
        }
    }
}

impl AppConfig {
    /// Display timezone; an unknown name falls back to the default.
    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(timezone = %self.timezone, "unknown timezone, using {DEFAULT_TIMEZONE}");
            chrono_tz::Asia::Dhaka
        })
    }

    /// Applies `EVENT_LAGBE_*` environment variables on top of the stored values.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| env::var(key).ok());
        self
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(url) = read("EVENT_LAGBE_API_URL") {
            self.api_base_url = url;
        }
        if let Some(cloud) = read("EVENT_LAGBE_CLOUDINARY_CLOUD") {
            self.cloudinary_cloud_name = Some(cloud);
        }
        if let Some(preset) = read("EVENT_LAGBE_CLOUDINARY_PRESET") {
            self.cloudinary_upload_preset = Some(preset);
        }
        if let Some(tz) = read("EVENT_LAGBE_TIMEZONE") {
            self.timezone = tz;
        }
        if let Some(level) = read("EVENT_LAGBE_LOG") {
            self.log_level = level;
        }
    }
}

/// The persisted config file. Environment overrides are never written back.
pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
    /// Set when the file exists but failed to load; writes are refused.
    load_error: Option<String>,
}

impl ConfigStore {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let (data, load_error) = match read_config(&path) {
            Ok(data) => (data, None),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable config");
                (AppConfig::default(), Some(err.to_string()))
            }
        };
        Self {
            path,
            data: Mutex::new(data),
            load_error,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored values only.
    pub fn stored(&self) -> AppConfig {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stored values with environment overrides applied.
    pub fn read(&self) -> AppConfig {
        self.stored().with_env_overrides()
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        if let Some(reason) = &self.load_error {
            return Err(ConfigError::Unreadable {
                path: self.path.clone(),
                reason: reason.clone(),
            });
        }
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        transform(&mut next);
        write_config(&self.path, &next)?;
        *guard = next;
        Ok(guard.clone().with_env_overrides())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    utils::ensure_parent(path).map_err(io_err)?;
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::load_from(dir.path().join("config.json"));
        let config = store.stored();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert!(config.session.is_none());
        assert_eq!(config.tz(), chrono_tz::Asia::Dhaka);
    }

    #[test]
    fn updates_persist_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");
        let store = ConfigStore::load_from(path.clone());
        store
            .update(|config| {
                config.api_base_url = "https://api.eventlagbe.test".to_string();
                config.cloudinary_cloud_name = Some("lagbe".to_string());
            })
            .expect("update");

        let reloaded = ConfigStore::load_from(path);
        let config = reloaded.stored();
        assert_eq!(config.api_base_url, "https://api.eventlagbe.test");
        assert_eq!(config.cloudinary_cloud_name.as_deref(), Some("lagbe"));
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"timezone": "Europe/London"}"#).expect("write");
        let config = ConfigStore::load_from(path).stored();
        assert_eq!(config.tz(), chrono_tz::Europe::London);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn corrupt_file_reads_as_defaults_but_is_never_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").expect("write");
        let store = ConfigStore::load_from(path.clone());
        assert_eq!(store.stored().log_level, DEFAULT_LOG_LEVEL);

        let err = store
            .update(|config| config.debounce_ms = 50)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
        assert_eq!(fs::read_to_string(&path).expect("read"), "{ not json");
    }

    #[test]
    fn overrides_replace_non_empty_values() {
        let vars: HashMap<&str, &str> = [
            ("EVENT_LAGBE_API_URL", "https://staging.example.com"),
            ("EVENT_LAGBE_TIMEZONE", "  "),
            ("EVENT_LAGBE_CLOUDINARY_PRESET", "unsigned_events"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "https://staging.example.com");
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
        assert_eq!(config.cloudinary_upload_preset.as_deref(), Some("unsigned_events"));
    }

    #[test]
    fn unknown_timezone_falls_back() {
        let config = AppConfig {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert_eq!(config.tz(), chrono_tz::Asia::Dhaka);
    }
}
