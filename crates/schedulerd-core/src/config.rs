//! Configuration model and loader.
//!
//! Mirrors the original Python scheduler's `load_config`: if the file is
//! missing, write a default document and warn; if present, fill in any
//! subtree or key missing relative to the default before parsing, so an
//! operator's partial config file never fails to load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRoot {
    pub db: DbConfig,
    pub scheduler: SchedulerConfig,
    pub mqtt: MqttConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: u32,
    pub connect_timeout: u64,
    pub charset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub poll_interval_sec: u64,
    pub batch: u32,
    pub mysql_session_time_zone: String,
    pub default_timezone: String,
    pub log_file: String,
    pub control_enabled: bool,
    pub control_host: String,
    pub control_port: u16,
    pub control_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id_prefix: String,
    pub keepalive: u64,
    pub tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub verify_tls: bool,
}

impl Default for ConfigRoot {
    fn default() -> Self {
        Self {
            db: DbConfig {
                host: "127.0.0.1".to_string(),
                port: 3306,
                user: "scheduler".to_string(),
                password: String::new(),
                database: "scheduler".to_string(),
                pool_size: 5,
                connect_timeout: 10,
                charset: "utf8mb4".to_string(),
            },
            scheduler: SchedulerConfig {
                poll_interval_sec: 2,
                batch: 20,
                mysql_session_time_zone: "+08:00".to_string(),
                default_timezone: "Asia/Taipei".to_string(),
                log_file: String::new(),
                control_enabled: true,
                control_host: "127.0.0.1".to_string(),
                control_port: 5055,
                control_token: String::new(),
            },
            mqtt: MqttConfig {
                host: "broker.emqx.io".to_string(),
                port: 1883,
                username: String::new(),
                password: String::new(),
                client_id_prefix: "sched-".to_string(),
                keepalive: 30,
                tls: false,
            },
            http: HttpConfig {
                user_agent: "JJ-Scheduler/3.0".to_string(),
                verify_tls: true,
            },
        }
    }
}

/// Load configuration from `path`. Writes a default document (and warns)
/// if the file does not exist. Fills any subtree/key missing relative to
/// the default before deserializing the typed document.
pub fn load_config(path: &Path) -> Result<ConfigRoot> {
    if !path.exists() {
        let default = ConfigRoot::default();
        let text = serde_json::to_string_pretty(&default)
            .map_err(|e| Error::config_with_source("failed to serialize default config", e))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::config_with_source("failed to create config dir", e))?;
            }
        }
        std::fs::write(path, text)
            .map_err(|e| Error::config_with_source("failed to write default config", e))?;
        tracing::warn!(path = %path.display(), "config file not found, wrote default");
        return Ok(default);
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::config_with_source("failed to read config file", e))?;
    let mut parsed: Value = serde_json::from_str(&raw)
        .map_err(|e| Error::config_with_source("failed to parse config file as JSON", e))?;

    let default_value = serde_json::to_value(ConfigRoot::default())
        .map_err(|e| Error::config_with_source("failed to build default config", e))?;
    merge_defaults(&mut parsed, &default_value);

    serde_json::from_value(parsed)
        .map_err(|e| Error::config_with_source("config file missing/invalid fields", e))
}

/// Fill missing object keys in `doc` from `default`, recursing one level
/// into each top-level subtree (matching the Python merge: top-level keys,
/// then per-subtree keys).
fn merge_defaults(doc: &mut Value, default: &Value) {
    let (Value::Object(doc_map), Value::Object(default_map)) = (doc, default) else {
        return;
    };
    for (key, default_val) in default_map {
        match doc_map.get_mut(key) {
            None => {
                doc_map.insert(key.clone(), default_val.clone());
            }
            Some(Value::Object(existing_map)) => {
                if let Value::Object(default_sub) = default_val {
                    for (sub_key, sub_default) in default_sub {
                        existing_map
                            .entry(sub_key.clone())
                            .or_insert_with(|| sub_default.clone());
                    }
                }
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = load_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.scheduler.poll_interval_sec, 2);
        assert_eq!(cfg.scheduler.default_timezone, "Asia/Taipei");
    }

    #[test]
    fn fills_missing_keys_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"scheduler": {"poll_interval_sec": 5}, "extra_unknown_key": true}"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.scheduler.poll_interval_sec, 5);
        // untouched nested key keeps the default
        assert_eq!(cfg.scheduler.batch, 20);
        // untouched top-level subtree keeps the whole default
        assert_eq!(cfg.db.port, 3306);
    }
}
