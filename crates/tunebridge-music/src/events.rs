use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tunebridge_core::{LinkInfo, PlaylistMetadata, TrackSearchResult};

pub const EVENT_PLAYLIST_METADATA: &str = "playlist_metadata";
pub const EVENT_PLAYLIST_TRACK: &str = "playlist_conversion_track";
pub const EVENT_PLAYLIST_DONE: &str = "playlist_conversion_done";
pub const EVENT_PLAYLIST_UPDATED: &str = "playlist_updated";

const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notify transport failed: {0}")]
    Transport(String),
    #[error("notify endpoint rejected event: status={status}")]
    Rejected { status: u16 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEvent {
    pub platform: String,
    pub meta: PlaylistMetadata,
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEvent {
    pub platform: String,
    pub task_id: String,
    pub track: TrackSearchResult,
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneEvent {
    pub task_id: String,
    pub playlist_id: String,
    pub source_platform: String,
    pub target_platform: String,
    pub event_type: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_playlist_metadata_event(
        &self,
        info: &LinkInfo,
        meta: &PlaylistMetadata,
    ) -> Result<(), NotifyError>;

    async fn send_track_event(&self, app_id: &str, event: &TrackEvent) -> Result<(), NotifyError>;

    async fn send_event(
        &self,
        app_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), NotifyError>;
}

/// Wraps a [`Notifier`] and swallows its failures after logging them.
#[derive(Clone)]
pub struct EventDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl EventDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub async fn metadata(&self, info: &LinkInfo, meta: &PlaylistMetadata) {
        if let Err(err) = self.notifier.send_playlist_metadata_event(info, meta).await {
            warn!(task_id = %info.task_id, error = %err, "failed to send metadata event");
        }
    }

    pub async fn track(&self, app_id: &str, platform: &str, task_id: &str, track: &TrackSearchResult) {
        let event = TrackEvent {
            platform: platform.to_string(),
            task_id: task_id.to_string(),
            track: track.clone(),
            event_type: EVENT_PLAYLIST_TRACK.to_string(),
        };
        if let Err(err) = self.notifier.send_track_event(app_id, &event).await {
            warn!(task_id, error = %err, "failed to send track event");
        }
    }

    pub async fn done(&self, info: &LinkInfo) {
        let event = DoneEvent {
            task_id: info.task_id.clone(),
            playlist_id: info.entity_id.clone(),
            source_platform: info.platform.clone(),
            target_platform: info.target_platform.clone(),
            event_type: EVENT_PLAYLIST_DONE.to_string(),
        };
        self.send(&info.app, EVENT_PLAYLIST_DONE, &event).await;
    }

    pub async fn send<T: Serialize + Sync>(&self, app_id: &str, event_type: &str, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(event_type, error = %err, "failed to encode event payload");
                return;
            }
        };
        if let Err(err) = self.notifier.send_event(app_id, event_type, &payload).await {
            warn!(app_id, event_type, error = %err, "failed to send event");
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_playlist_metadata_event(
        &self,
        info: &LinkInfo,
        meta: &PlaylistMetadata,
    ) -> Result<(), NotifyError> {
        info!(
            task_id = %info.task_id,
            platform = %info.platform,
            title = %meta.title,
            tracks = meta.nb_tracks,
            "playlist metadata resolved"
        );
        Ok(())
    }

    async fn send_track_event(&self, app_id: &str, event: &TrackEvent) -> Result<(), NotifyError> {
        debug!(
            app_id,
            task_id = %event.task_id,
            platform = %event.platform,
            track = %event.track.title,
            "track matched"
        );
        Ok(())
    }

    async fn send_event(
        &self,
        app_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), NotifyError> {
        info!(app_id, event_type, %payload, "event");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierEvent {
    Metadata { app_id: String, event: MetadataEvent },
    Track { app_id: String, event: TrackEvent },
    Custom { app_id: String, event_type: String, payload: Value },
}

impl NotifierEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::Metadata { event, .. } => &event.event_type,
            Self::Track { event, .. } => &event.event_type,
            Self::Custom { event_type, .. } => event_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<NotifierEvent>,
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotifierEvent> {
        self.sender.subscribe()
    }

    fn emit(&self, event: NotifierEvent) {
        self.sender.send(event).ok();
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn send_playlist_metadata_event(
        &self,
        info: &LinkInfo,
        meta: &PlaylistMetadata,
    ) -> Result<(), NotifyError> {
        self.emit(NotifierEvent::Metadata {
            app_id: info.app.clone(),
            event: MetadataEvent {
                platform: info.platform.clone(),
                meta: meta.clone(),
                event_type: EVENT_PLAYLIST_METADATA.to_string(),
            },
        });
        Ok(())
    }

    async fn send_track_event(&self, app_id: &str, event: &TrackEvent) -> Result<(), NotifyError> {
        self.emit(NotifierEvent::Track {
            app_id: app_id.to_string(),
            event: event.clone(),
        });
        Ok(())
    }

    async fn send_event(
        &self,
        app_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), NotifyError> {
        self.emit(NotifierEvent::Custom {
            app_id: app_id.to_string(),
            event_type: event_type.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookEnvelope<'a, T: Serialize> {
    app_id: &'a str,
    event_type: &'a str,
    payload: &'a T,
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .user_agent("tunebridge/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| NotifyError::Transport(format!("failed to build http client: {err}")))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn post<T: Serialize + Sync>(
        &self,
        app_id: &str,
        event_type: &str,
        payload: &T,
    ) -> Result<(), NotifyError> {
        let envelope = WebhookEnvelope {
            app_id,
            event_type,
            payload,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&envelope)
            .send()
            .await
            .map_err(|err| NotifyError::Transport(format!("webhook request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_playlist_metadata_event(
        &self,
        info: &LinkInfo,
        meta: &PlaylistMetadata,
    ) -> Result<(), NotifyError> {
        let event = MetadataEvent {
            platform: info.platform.clone(),
            meta: meta.clone(),
            event_type: EVENT_PLAYLIST_METADATA.to_string(),
        };
        self.post(&info.app, EVENT_PLAYLIST_METADATA, &event).await
    }

    async fn send_track_event(&self, app_id: &str, event: &TrackEvent) -> Result<(), NotifyError> {
        self.post(app_id, &event.event_type, event).await
    }

    async fn send_event(
        &self,
        app_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), NotifyError> {
        self.post(app_id, event_type, payload).await
    }
}

#[derive(Clone, Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

fn first_error(results: Vec<Result<(), NotifyError>>) -> Result<(), NotifyError> {
    results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn send_playlist_metadata_event(
        &self,
        info: &LinkInfo,
        meta: &PlaylistMetadata,
    ) -> Result<(), NotifyError> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for notifier in &self.notifiers {
            results.push(notifier.send_playlist_metadata_event(info, meta).await);
        }
        first_error(results)
    }

    async fn send_track_event(&self, app_id: &str, event: &TrackEvent) -> Result<(), NotifyError> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for notifier in &self.notifiers {
            results.push(notifier.send_track_event(app_id, event).await);
        }
        first_error(results)
    }

    async fn send_event(
        &self,
        app_id: &str,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), NotifyError> {
        let mut results = Vec::with_capacity(self.notifiers.len());
        for notifier in &self.notifiers {
            results.push(notifier.send_event(app_id, event_type, payload).await);
        }
        first_error(results)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tunebridge_core::EntityKind;

    use super::*;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_playlist_metadata_event(
            &self,
            _info: &LinkInfo,
            _meta: &PlaylistMetadata,
        ) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("down".to_string()))
        }

        async fn send_track_event(&self, _: &str, _: &TrackEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected { status: 503 })
        }

        async fn send_event(&self, _: &str, _: &str, _: &Value) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected { status: 500 })
        }
    }

    fn info() -> LinkInfo {
        LinkInfo {
            platform: "spotify".to_string(),
            target_platform: "deezer".to_string(),
            entity: EntityKind::Playlist,
            entity_id: "p1".to_string(),
            target_link: String::new(),
            task_id: "task-1".to_string(),
            app: "app-1".to_string(),
        }
    }

    #[tokio::test]
    async fn dispatcher_emits_done_event_shape() {
        let bus = BroadcastNotifier::default();
        let mut rx = bus.subscribe();
        let dispatcher = EventDispatcher::new(Arc::new(bus));

        dispatcher.done(&info()).await;

        match rx.recv().await.unwrap() {
            NotifierEvent::Custom {
                app_id,
                event_type,
                payload,
            } => {
                assert_eq!(app_id, "app-1");
                assert_eq!(event_type, EVENT_PLAYLIST_DONE);
                assert_eq!(
                    payload,
                    json!({
                        "task_id": "task-1",
                        "playlist_id": "p1",
                        "source_platform": "spotify",
                        "target_platform": "deezer",
                        "event_type": "playlist_conversion_done"
                    })
                );
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatcher_swallows_notifier_failures() {
        let dispatcher = EventDispatcher::new(Arc::new(FailingNotifier));
        dispatcher.metadata(&info(), &PlaylistMetadata::default()).await;
        dispatcher
            .track("app-1", "deezer", "task-1", &TrackSearchResult::default())
            .await;
        dispatcher.done(&info()).await;
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_ok() {
        let bus = BroadcastNotifier::new(4);
        let result = bus.send_event("app", "anything", &json!({})).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn fanout_reaches_every_notifier_and_reports_failure() {
        let bus = BroadcastNotifier::default();
        let mut rx = bus.subscribe();
        let fanout = FanoutNotifier::new()
            .with(Arc::new(FailingNotifier))
            .with(Arc::new(bus));
        assert_eq!(fanout.len(), 2);

        let result = fanout.send_event("app", "ping", &json!({"n": 1})).await;
        assert!(matches!(result, Err(NotifyError::Rejected { status: 500 })));
        assert_eq!(rx.recv().await.unwrap().event_type(), "ping");
    }

    #[test]
    fn webhook_envelope_wraps_payload() {
        let payload = json!({"a": 1});
        let envelope = WebhookEnvelope {
            app_id: "app",
            event_type: "ping",
            payload: &payload,
        };
        let encoded = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            encoded,
            json!({"app_id": "app", "event_type": "ping", "payload": {"a": 1}})
        );
    }
}
