use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tunebridge_core::{EntityKind, LinkInfo, PlaylistConversion, TuneResult, new_task_id};
use tunebridge_music::events::EVENT_PLAYLIST_UPDATED;
use tunebridge_music::{Converter, Freshness, LinkResolver, UrlLinkResolver};
use uuid::Uuid;

use crate::queue::{DedupStrategy, QueuedTask, SyncTask, TaskQueue};
use crate::store::{FollowStore, Notification, NotificationStore};

pub const DEFAULT_FAILURE_BACKOFF_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// How long a failed follow sits out before it is retried.
    pub failure_backoff: chrono::Duration,
    pub dedup: DedupStrategy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_secs(DEFAULT_FAILURE_BACKOFF_SECS, DedupStrategy::default())
    }
}

impl SyncSettings {
    pub fn from_secs(failure_backoff_secs: u64, dedup: DedupStrategy) -> Self {
        let failure_backoff = i64::try_from(failure_backoff_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_FAILURE_BACKOFF_SECS as i64));
        Self {
            failure_backoff,
            dedup,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPassReport {
    pub eligible: usize,
    pub enqueued: usize,
    pub deduplicated: usize,
    pub unresolved: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub handled: usize,
    pub first_conversions: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub notifications: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    FirstConversion,
    Unchanged,
    Updated { notifications: usize },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistUpdatedEvent {
    pub task_id: String,
    pub entity_id: String,
    pub source_platform: String,
    pub target_platform: String,
    pub subscribers: usize,
    pub event_type: String,
}

pub struct SyncScheduler {
    follows: Arc<dyn FollowStore>,
    notifications: Arc<dyn NotificationStore>,
    queue: Arc<dyn TaskQueue>,
    converter: Converter,
    resolver: Arc<dyn LinkResolver>,
    settings: SyncSettings,
}

impl SyncScheduler {
    pub fn new(
        follows: Arc<dyn FollowStore>,
        notifications: Arc<dyn NotificationStore>,
        queue: Arc<dyn TaskQueue>,
        converter: Converter,
    ) -> Self {
        Self {
            follows,
            notifications,
            queue,
            converter,
            resolver: Arc::new(UrlLinkResolver),
            settings: SyncSettings::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn LinkResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    #[instrument(skip_all, fields(dedup = %self.settings.dedup))]
    pub async fn run_pass(&self) -> TuneResult<SyncPassReport> {
        let records = self
            .follows
            .list_eligible(Utc::now(), self.settings.failure_backoff)
            .await?;
        let mut report = SyncPassReport {
            eligible: records.len(),
            ..Default::default()
        };

        for record in records {
            let info = match self.resolver.resolve(&record.entity_url).await {
                Ok(info) => info,
                Err(err) => {
                    warn!(entity_id = %record.entity_id, error = %err, "follow url no longer resolves");
                    report.unresolved += 1;
                    continue;
                }
            };
            let task = SyncTask {
                user: record.uuid.to_string(),
                url: record.entity_url.clone(),
                entity_id: record.entity_id.clone(),
                platform: info.platform,
                target_platform: record.target_platform.clone(),
                app: record.app.clone(),
                developer: record.developer.clone(),
            };
            let key = self.settings.dedup.key_for(&task);
            if self.queue.enqueue(QueuedTask::new(task, key)).await? {
                report.enqueued += 1;
            } else {
                debug!(entity_id = %record.entity_id, "sync task deduplicated");
                report.deduplicated += 1;
            }
        }

        info!(
            eligible = report.eligible,
            enqueued = report.enqueued,
            deduplicated = report.deduplicated,
            unresolved = report.unresolved,
            "sync pass finished"
        );
        Ok(report)
    }

    pub async fn drain(&self, cancel: &CancellationToken) -> TuneResult<DrainReport> {
        let mut report = DrainReport::default();
        while !cancel.is_cancelled() {
            let Some(task) = self.queue.dequeue().await? else {
                break;
            };
            report.handled += 1;
            match self.handle_task(&task.payload, cancel).await {
                Ok(TaskOutcome::FirstConversion) => report.first_conversions += 1,
                Ok(TaskOutcome::Unchanged) => report.unchanged += 1,
                Ok(TaskOutcome::Updated { notifications }) => {
                    report.updated += 1;
                    report.notifications += notifications;
                }
                Ok(TaskOutcome::Cancelled) => report.cancelled += 1,
                Err(_) => report.failed += 1,
            }
        }
        Ok(report)
    }

    pub async fn run_once(
        &self,
        cancel: &CancellationToken,
    ) -> TuneResult<(SyncPassReport, DrainReport)> {
        let pass = self.run_pass().await?;
        let drained = self.drain(cancel).await?;
        Ok((pass, drained))
    }

    #[instrument(skip_all, fields(entity_id = %task.entity_id, platform = %task.platform, target = %task.target_platform))]
    pub async fn handle_task(
        &self,
        task: &SyncTask,
        cancel: &CancellationToken,
    ) -> TuneResult<TaskOutcome> {
        match self.process(task, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_transient() => {
                warn!(error = %err, "sync task failed, retrying next pass");
                Err(err)
            }
            Err(err) => {
                error!(error = %err, "sync task failed");
                if let Err(mark_err) = self.follows.mark_failed(&task.entity_id, Utc::now()).await {
                    warn!(error = %mark_err, "failed to mark follow as failed");
                }
                Err(err)
            }
        }
    }

    async fn process(&self, task: &SyncTask, cancel: &CancellationToken) -> TuneResult<TaskOutcome> {
        let info = LinkInfo {
            platform: task.platform.clone(),
            target_platform: task.target_platform.clone(),
            entity: EntityKind::Playlist,
            entity_id: task.entity_id.clone(),
            target_link: task.url.clone(),
            task_id: new_task_id(),
            app: task.app.clone(),
        };

        let outcome = self
            .converter
            .convert_playlist_with_status(&info, cancel)
            .await?;
        if outcome.cancelled {
            info!("sync conversion cancelled, follow left untouched");
            return Ok(TaskOutcome::Cancelled);
        }

        let result = match outcome.freshness {
            Freshness::FirstConversion => {
                debug!("first conversion stored, no notification");
                TaskOutcome::FirstConversion
            }
            Freshness::Cached => TaskOutcome::Unchanged,
            Freshness::Changed => {
                let notifications = self.notify_subscribers(&info, &outcome.conversion).await?;
                TaskOutcome::Updated { notifications }
            }
        };

        self.follows.touch(&task.entity_id, Utc::now()).await?;
        Ok(result)
    }

    async fn notify_subscribers(
        &self,
        info: &LinkInfo,
        conversion: &PlaylistConversion,
    ) -> TuneResult<usize> {
        let Some(record) = self.follows.find_by_entity(&info.entity_id).await? else {
            warn!("follow record vanished before notifying");
            return Ok(0);
        };

        let data = serde_json::to_string(conversion)?;
        let batch: Vec<Notification> = record
            .subscribers
            .iter()
            .map(|subscriber| Notification {
                subscriber: *subscriber,
                notification_id: Uuid::new_v4(),
                data: data.clone(),
            })
            .collect();
        let inserted = self.notifications.insert_batch(batch).await?;

        let event = PlaylistUpdatedEvent {
            task_id: info.task_id.clone(),
            entity_id: info.entity_id.clone(),
            source_platform: info.platform.clone(),
            target_platform: info.target_platform.clone(),
            subscribers: inserted,
            event_type: EVENT_PLAYLIST_UPDATED.to_string(),
        };
        self.converter
            .events()
            .send(&info.app, EVENT_PLAYLIST_UPDATED, &event)
            .await;

        info!(inserted, "subscribers notified");
        Ok(inserted)
    }
}
