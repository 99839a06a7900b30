//! Persisted configuration record.
//!
//! Embedding applications keep one record of the shape
//! `{accountId, gatewayId, apiKey, authToken, model, voice}` under a fixed
//! storage key. The store is a JSON object keyed by storage key so that other
//! entries written by the same application survive a save.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{GatewayConfig, Secret};
use crate::core::error::{GatewayError, GatewayResult};

/// Fixed key the record is stored under.
pub const STORAGE_KEY: &str = "cf-aig-realtime-config";

/// The persisted record. Credentials are stored in clear text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredConfig {
    pub account_id: String,
    pub gateway_id: String,
    pub api_key: String,
    pub auth_token: String,
    pub model: String,
    pub voice: String,
}

impl StoredConfig {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            account_id: config.account_id.clone(),
            gateway_id: config.gateway_id.clone(),
            api_key: config
                .api_key
                .as_ref()
                .map(|k| k.expose().to_string())
                .unwrap_or_default(),
            auth_token: config
                .auth_token
                .as_ref()
                .map(|t| t.expose().to_string())
                .unwrap_or_default(),
            model: config.model.clone(),
            voice: config.voice.clone(),
        }
    }

    /// Overlay non-empty stored values onto `config`.
    pub fn apply_to(&self, config: &mut GatewayConfig) {
        if !self.account_id.is_empty() {
            config.account_id = self.account_id.clone();
        }
        if !self.gateway_id.is_empty() {
            config.gateway_id = self.gateway_id.clone();
        }
        if let Some(key) = Secret::non_empty(self.api_key.as_str()) {
            config.api_key = Some(key);
        }
        if let Some(token) = Secret::non_empty(self.auth_token.as_str()) {
            config.auth_token = Some(token);
        }
        if !self.model.is_empty() {
            config.model = self.model.clone();
        }
        if !self.voice.is_empty() {
            config.voice = self.voice.clone();
        }
    }
}

/// JSON file holding records keyed by storage key.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record stored under [`STORAGE_KEY`], `None` when nothing is stored yet.
    pub fn load(&self) -> GatewayResult<Option<StoredConfig>> {
        let entries = self.read_entries()?;
        match entries.get(STORAGE_KEY) {
            Some(value) => {
                let record = serde_json::from_value(value.clone()).map_err(|e| {
                    GatewayError::Configuration(format!(
                        "Stored record under '{STORAGE_KEY}' is malformed: {e}"
                    ))
                })?;
                debug!("Loaded stored configuration from {}", self.path.display());
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Write `record` under [`STORAGE_KEY`], keeping any other keys in the file.
    pub fn save(&self, record: &StoredConfig) -> GatewayResult<()> {
        let mut entries = self.read_entries()?;
        let value = serde_json::to_value(record)
            .map_err(|e| GatewayError::Configuration(format!("Failed to encode record: {e}")))?;
        entries.insert(STORAGE_KEY.to_string(), value);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::Configuration(format!(
                    "Failed to create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let contents = serde_json::to_string_pretty(&Value::Object(entries))
            .map_err(|e| GatewayError::Configuration(format!("Failed to encode store: {e}")))?;
        std::fs::write(&self.path, contents).map_err(|e| {
            GatewayError::Configuration(format!(
                "Failed to write config store {}: {e}",
                self.path.display()
            ))
        })?;

        info!("Saved configuration to {}", self.path.display());
        Ok(())
    }

    fn read_entries(&self) -> GatewayResult<Map<String, Value>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(GatewayError::Configuration(format!(
                    "Failed to read config store {}: {e}",
                    self.path.display()
                )));
            }
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(GatewayError::Configuration(format!(
                "Config store {} is not a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(GatewayError::Configuration(format!(
                "Failed to parse config store {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record() -> StoredConfig {
        StoredConfig {
            account_id: "acct".to_string(),
            gateway_id: "gw".to_string(),
            api_key: "sk-stored".to_string(),
            auth_token: "cf-stored".to_string(),
            model: "gpt-4o".to_string(),
            voice: "verse".to_string(),
        }
    }

    #[test]
    fn test_load_missing_file_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("store.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("store.json"));
        store.save(&record()).unwrap();
        assert_eq!(store.load().unwrap(), Some(record()));
    }

    #[test]
    fn test_record_uses_camel_case_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let store = ConfigStore::new(&path);
        store.save(&record()).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &raw[STORAGE_KEY];
        assert_eq!(entry["accountId"], "acct");
        assert_eq!(entry["gatewayId"], "gw");
        assert_eq!(entry["apiKey"], "sk-stored");
        assert_eq!(entry["authToken"], "cf-stored");
        assert_eq!(entry["model"], "gpt-4o");
        assert_eq!(entry["voice"], "verse");
    }

    #[test]
    fn test_save_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, r#"{"theme": "dark"}"#).unwrap();

        let store = ConfigStore::new(&path);
        store.save(&record()).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert!(raw.get(STORAGE_KEY).is_some());
    }

    #[test]
    fn test_partial_record_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(
            &path,
            format!(r#"{{"{STORAGE_KEY}": {{"accountId": "a", "gatewayId": "g"}}}}"#),
        )
        .unwrap();

        let loaded = ConfigStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.account_id, "a");
        assert!(loaded.auth_token.is_empty());
    }

    #[test]
    fn test_non_object_store_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(ConfigStore::new(&path).load().is_err());
    }

    #[test]
    fn test_apply_to_round_trips_through_config() {
        let mut config = GatewayConfig::default();
        record().apply_to(&mut config);
        assert_eq!(config.account_id, "acct");
        assert_eq!(config.api_key, Some(Secret::new("sk-stored")));
        assert_eq!(StoredConfig::from_config(&config), record());
    }

    #[test]
    fn test_apply_to_skips_empty_fields() {
        let mut config = GatewayConfig {
            model: "keep-me".to_string(),
            ..Default::default()
        };
        StoredConfig::default().apply_to(&mut config);
        assert_eq!(config.model, "keep-me");
        assert!(config.api_key.is_none());
    }
}
