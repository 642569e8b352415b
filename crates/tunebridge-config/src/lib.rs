mod config;

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::config::TuneConfig;
use tunebridge_core::{TuneError, TuneResult};

pub use config::{
    CacheConfig, DEFAULT_FAILURE_BACKOFF_SECS, DEFAULT_QUEUE_CAPACITY, DEFAULT_RETENTION_SECS,
    DEFAULT_SYNC_INTERVAL_SECS, DEFAULT_TRACK_TTL_SECS, DEFAULT_WORKERS, DefaultConfig, LogConfig,
    MatchingConfig, NotifyConfig, SyncConfig, TuneConfig as TuneConfigData,
};

pub fn config_path() -> TuneResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TuneError::Configuration("home directory not found".to_string()))?;
    Ok(home.join(".tunebridge").join("config.toml"))
}

pub fn load_config() -> TuneResult<TuneConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(TuneConfig::default());
    }
    let content = fs::read_to_string(&path)
        .map_err(|err| TuneError::Configuration(format!("failed to read config: {err}")))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> TuneResult<TuneConfig> {
    toml::from_str(content)
        .map_err(|err| TuneError::Configuration(format!("failed to parse config: {err}")))
}

pub fn save_config(config: &TuneConfig) -> TuneResult<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            TuneError::Configuration(format!("failed to create config dir: {err}"))
        })?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|err| TuneError::Configuration(format!("failed to serialize config: {err}")))?;
    fs::write(&path, content)
        .map_err(|err| TuneError::Configuration(format!("failed to write config: {err}")))?;
    Ok(())
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub fn resolve_default_target(config: &TuneConfig) -> Option<String> {
    env_value("TUNEBRIDGE_DEFAULT_TARGET").or_else(|| config.default.target.clone())
}

pub fn resolve_webhook_url(config: &TuneConfig) -> Option<String> {
    env_value("TUNEBRIDGE_WEBHOOK_URL").or_else(|| config.notify.webhook_url.clone())
}

pub fn resolve_log_level(config: &TuneConfig) -> String {
    env_value("TUNEBRIDGE_LOG_LEVEL")
        .or_else(|| config.log.level.clone())
        .unwrap_or_else(|| "info".to_string())
}

pub fn resolve_workers(config: &TuneConfig) -> usize {
    env_value("TUNEBRIDGE_WORKERS")
        .and_then(|value| value.trim().parse::<usize>().ok())
        .or(config.matching.workers)
        .unwrap_or(DEFAULT_WORKERS)
        .max(1)
}

pub fn get_config_value(config: &TuneConfig, key_path: &str) -> Option<String> {
    let parts: Vec<&str> = key_path.split('.').collect();

    match parts.as_slice() {
        ["default", "target"] => config.default.target.clone(),
        ["matching", "workers"] => config.matching.workers.map(|v| v.to_string()),
        ["matching", "queue_capacity"] => config.matching.queue_capacity.map(|v| v.to_string()),
        ["matching", "timeout_secs"] => config.matching.timeout_secs.map(|v| v.to_string()),
        ["cache", "track_ttl_secs"] => config.cache.track_ttl_secs.map(|v| v.to_string()),
        ["sync", "failure_backoff_secs"] => config.sync.failure_backoff_secs.map(|v| v.to_string()),
        ["sync", "retention_secs"] => config.sync.retention_secs.map(|v| v.to_string()),
        ["sync", "dedup"] => config.sync.dedup.clone(),
        ["sync", "interval_secs"] => config.sync.interval_secs.map(|v| v.to_string()),
        ["notify", "webhook_url"] => config.notify.webhook_url.clone(),
        ["log", "level"] => config.log.level.clone(),
        ["log", "format"] => config.log.format.clone(),
        _ => None,
    }
}

fn toml_value_for(value: &str) -> toml_edit::Item {
    match value.trim().parse::<i64>() {
        Ok(number) => toml_edit::value(number),
        Err(_) => toml_edit::value(value),
    }
}

pub fn set_config_value(key_path: &str, value: &str) -> TuneResult<()> {
    let path = config_path()?;
    let content = if path.exists() {
        fs::read_to_string(&path)
            .map_err(|err| TuneError::Configuration(format!("failed to read config: {err}")))?
    } else {
        String::new()
    };

    let updated = apply_config_value(&content, key_path, value)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            TuneError::Configuration(format!("failed to create config dir: {err}"))
        })?;
    }
    fs::write(&path, updated)
        .map_err(|err| TuneError::Configuration(format!("failed to write config: {err}")))?;

    Ok(())
}

/// Applies `key_path = value` to a TOML document, keeping comments and ordering intact.
pub fn apply_config_value(content: &str, key_path: &str, value: &str) -> TuneResult<String> {
    let mut doc = content
        .parse::<toml_edit::DocumentMut>()
        .unwrap_or_default();

    let parts: Vec<&str> = key_path.split('.').collect();
    let Some((last_part, parents)) = parts.split_last() else {
        return Err(TuneError::Configuration("empty key path".to_string()));
    };
    if parents.is_empty() {
        return Err(TuneError::Configuration(
            "key path must have at least 2 parts (e.g., 'matching.workers')".to_string(),
        ));
    }

    let mut current = doc.as_table_mut();
    for part in parents {
        current = current
            .entry(part)
            .or_insert(toml_edit::Item::Table(Default::default()))
            .as_table_mut()
            .ok_or_else(|| {
                TuneError::Configuration(format!("cannot set nested value in '{}'", key_path))
            })?;
    }
    current[*last_part] = toml_value_for(value);

    let updated = doc.to_string();
    parse_config(&updated)?;
    Ok(updated)
}

pub fn open_in_editor() -> TuneResult<()> {
    let path = config_path()?;
    if !path.exists() {
        save_config(&TuneConfig::default())?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| {
        if cfg!(target_os = "windows") {
            "notepad".to_string()
        } else {
            "nano".to_string()
        }
    });

    let status = Command::new(&editor).arg(&path).status().map_err(|err| {
        TuneError::Configuration(format!("failed to open editor '{}': {}", editor, err))
    })?;

    if !status.success() {
        return Err(TuneError::Configuration(format!(
            "editor exited with status: {}",
            status
        )));
    }

    Ok(())
}
