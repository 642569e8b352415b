use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tunebridge_core::{TuneError, TuneResult};
use uuid::Uuid;

pub const DEFAULT_RETENTION_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub user: String,
    pub url: String,
    pub entity_id: String,
    pub platform: String,
    pub target_platform: String,
    pub app: String,
    pub developer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    #[default]
    PerRun,
    PerEntity,
}

impl DedupStrategy {
    pub fn key_for(&self, task: &SyncTask) -> String {
        match self {
            Self::PerRun => format!("sync:{}", Uuid::new_v4()),
            Self::PerEntity => format!("sync:{}:{}", task.platform, task.entity_id),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerRun => "per_run",
            Self::PerEntity => "per_entity",
        }
    }
}

impl fmt::Display for DedupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupStrategy {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "per_run" => Ok(Self::PerRun),
            "per_entity" => Ok(Self::PerEntity),
            other => Err(TuneError::Configuration(format!(
                "unknown dedup strategy {other}, expected per_run or per_entity"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: Uuid,
    pub dedup_key: String,
    pub payload: SyncTask,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(payload: SyncTask, dedup_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dedup_key: dedup_key.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Returns `false` when the dedup key is still retained and the task was dropped.
    async fn enqueue(&self, task: QueuedTask) -> TuneResult<bool>;

    async fn dequeue(&self) -> TuneResult<Option<QueuedTask>>;

    async fn pending(&self) -> TuneResult<usize>;
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueuedTask>,
    seen: HashMap<String, DateTime<Utc>>,
}

#[derive(Debug)]
pub struct MemoryTaskQueue {
    retention: chrono::Duration,
    state: Mutex<QueueState>,
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new(chrono::Duration::seconds(DEFAULT_RETENTION_SECS))
    }
}

impl MemoryTaskQueue {
    pub fn new(retention: chrono::Duration) -> Self {
        Self {
            retention,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn with_retention_secs(secs: u64) -> Self {
        let retention = i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_RETENTION_SECS));
        Self::new(retention)
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: QueuedTask) -> TuneResult<bool> {
        let mut state = self.state.lock().await;
        let now = task.enqueued_at;
        let retention = self.retention;
        state.seen.retain(|_, at| now - *at < retention);
        if state.seen.contains_key(&task.dedup_key) {
            return Ok(false);
        }
        state.seen.insert(task.dedup_key.clone(), now);
        state.pending.push_back(task);
        Ok(true)
    }

    async fn dequeue(&self) -> TuneResult<Option<QueuedTask>> {
        Ok(self.state.lock().await.pending.pop_front())
    }

    async fn pending(&self) -> TuneResult<usize> {
        Ok(self.state.lock().await.pending.len())
    }
}
