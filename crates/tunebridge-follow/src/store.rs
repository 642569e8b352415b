use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tunebridge_core::{TuneError, TuneResult};
use uuid::Uuid;

use crate::record::{FollowRecord, FollowStatus, SubscriberId};

#[async_trait]
pub trait FollowStore: Send + Sync {
    async fn find_by_entity(&self, entity_id: &str) -> TuneResult<Option<FollowRecord>>;

    async fn create(&self, record: FollowRecord) -> TuneResult<()>;

    async fn add_subscribers(&self, entity_id: &str, subscribers: &[SubscriberId])
    -> TuneResult<usize>;

    async fn list_eligible(
        &self,
        now: DateTime<Utc>,
        failure_backoff: chrono::Duration,
    ) -> TuneResult<Vec<FollowRecord>>;

    async fn touch(&self, entity_id: &str, at: DateTime<Utc>) -> TuneResult<()>;

    async fn mark_failed(&self, entity_id: &str, at: DateTime<Utc>) -> TuneResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subscriber: SubscriberId,
    pub notification_id: Uuid,
    pub data: String,
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts the whole batch or nothing.
    async fn insert_batch(&self, batch: Vec<Notification>) -> TuneResult<usize>;

    async fn list_for(&self, subscriber: &SubscriberId) -> TuneResult<Vec<Notification>>;
}

#[derive(Debug, Default)]
pub struct MemoryFollowStore {
    records: Mutex<HashMap<String, FollowRecord>>,
}

impl MemoryFollowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl FollowStore for MemoryFollowStore {
    async fn find_by_entity(&self, entity_id: &str) -> TuneResult<Option<FollowRecord>> {
        Ok(self.records.lock().await.get(entity_id).cloned())
    }

    async fn create(&self, record: FollowRecord) -> TuneResult<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.entity_id) {
            return Err(TuneError::AlreadyFollowing {
                entity_id: record.entity_id,
            });
        }
        records.insert(record.entity_id.clone(), record);
        Ok(())
    }

    async fn add_subscribers(
        &self,
        entity_id: &str,
        subscribers: &[SubscriberId],
    ) -> TuneResult<usize> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(entity_id)
            .ok_or_else(|| TuneError::NotFound(format!("follow for {entity_id}")))?;
        record.subscribers.extend_checked(subscribers)
    }

    async fn list_eligible(
        &self,
        now: DateTime<Utc>,
        failure_backoff: chrono::Duration,
    ) -> TuneResult<Vec<FollowRecord>> {
        let records = self.records.lock().await;
        let mut eligible: Vec<FollowRecord> = records
            .values()
            .filter(|record| record.is_eligible(now, failure_backoff))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(eligible)
    }

    async fn touch(&self, entity_id: &str, at: DateTime<Utc>) -> TuneResult<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(entity_id) {
            record.status = FollowStatus::Active;
            record.updated_at = at;
        }
        Ok(())
    }

    async fn mark_failed(&self, entity_id: &str, at: DateTime<Utc>) -> TuneResult<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(entity_id) {
            record.status = FollowStatus::Failed;
            record.updated_at = at;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    rows: Mutex<Vec<Notification>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Notification> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert_batch(&self, batch: Vec<Notification>) -> TuneResult<usize> {
        let inserted = batch.len();
        self.rows.lock().await.extend(batch);
        Ok(inserted)
    }

    async fn list_for(&self, subscriber: &SubscriberId) -> TuneResult<Vec<Notification>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| row.subscriber == *subscriber)
            .cloned()
            .collect())
    }
}
