use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use tunebridge_core::{
    PlaylistConversion, TrackSearchResult, TuneError, TuneResult, normalize_key_part,
};

use crate::store::CacheStore;

pub const DEFAULT_TRACK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotState {
    Unchanged(Box<PlaylistConversion>),
    Changed,
    Missing,
}

pub fn playlist_key(platform: &str, entity_id: &str) -> String {
    format!("{platform}:playlist:{entity_id}")
}

pub fn snapshot_key(platform: &str, entity_id: &str) -> String {
    format!("{platform}:snapshot:{entity_id}")
}

pub fn track_key(platform: &str, artist: &str, title: &str) -> String {
    format!(
        "{platform}-{}-{}",
        normalize_key_part(artist),
        normalize_key_part(title)
    )
}

#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<dyn CacheStore>,
    track_ttl: Duration,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            track_ttl: DEFAULT_TRACK_TTL,
        }
    }

    pub fn with_track_ttl(mut self, ttl: Duration) -> Self {
        self.track_ttl = ttl;
        self
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> TuneResult<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|err| {
                TuneError::Serialization(format!("failed to decode cache entry {key}: {err}"))
            }),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> TuneResult<()> {
        let raw = serde_json::to_string(value).map_err(|err| {
            TuneError::Serialization(format!("failed to encode cache entry {key}: {err}"))
        })?;
        self.store.set(key, raw, ttl).await
    }

    pub async fn marker(&self, platform: &str, entity_id: &str) -> TuneResult<Option<String>> {
        self.read_json(&snapshot_key(platform, entity_id)).await
    }

    pub async fn cached_playlist(
        &self,
        platform: &str,
        entity_id: &str,
    ) -> TuneResult<Option<PlaylistConversion>> {
        self.read_json(&playlist_key(platform, entity_id)).await
    }

    /// A cached result that lacks `target` counts as changed.
    pub async fn check(
        &self,
        platform: &str,
        entity_id: &str,
        current_marker: &str,
        target: &str,
    ) -> TuneResult<SnapshotState> {
        let Some(cached_marker) = self.marker(platform, entity_id).await? else {
            return Ok(SnapshotState::Missing);
        };

        if cached_marker != current_marker {
            debug!(platform, entity_id, cached_marker, current_marker, "snapshot marker moved");
            return Ok(SnapshotState::Changed);
        }

        match self.cached_playlist(platform, entity_id).await {
            Ok(Some(conversion)) if conversion.platforms.contains_key(target) => {
                Ok(SnapshotState::Unchanged(Box::new(conversion)))
            }
            Ok(_) => Ok(SnapshotState::Changed),
            Err(err @ TuneError::Serialization(_)) => {
                warn!(platform, entity_id, error = %err, "discarding unreadable playlist snapshot");
                Ok(SnapshotState::Changed)
            }
            Err(err) => Err(err),
        }
    }

    // result first: a reader seeing the new marker finds a result at least as new
    pub async fn store(
        &self,
        platform: &str,
        entity_id: &str,
        marker: &str,
        conversion: &PlaylistConversion,
    ) -> TuneResult<()> {
        self.write_json(&playlist_key(platform, entity_id), conversion, None)
            .await?;
        self.write_json(&snapshot_key(platform, entity_id), marker, None)
            .await
    }

    pub async fn cached_track(
        &self,
        platform: &str,
        artist: &str,
        title: &str,
    ) -> TuneResult<Option<TrackSearchResult>> {
        self.read_json(&track_key(platform, artist, title)).await
    }

    pub async fn store_track(
        &self,
        platform: &str,
        artist: &str,
        title: &str,
        track: &TrackSearchResult,
    ) -> TuneResult<()> {
        self.write_json(&track_key(platform, artist, title), track, Some(self.track_ttl))
            .await
    }
}
