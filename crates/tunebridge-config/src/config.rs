use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_TRACK_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_FAILURE_BACKOFF_SECS: u64 = 60 * 60;
pub const DEFAULT_RETENTION_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultConfig {
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatchingConfig {
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    pub track_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    pub failure_backoff_secs: Option<u64>,
    pub retention_secs: Option<u64>,
    /// `per_run` or `per_entity`
    pub dedup: Option<String>,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    pub level: Option<String>,
    /// `pretty`, `compact` or `json`
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TuneConfig {
    #[serde(default)]
    pub default: DefaultConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub log: LogConfig,
}
