use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use tunebridge_cache::{EntityLocks, SnapshotCache, SnapshotState};
use tunebridge_core::{
    EntityKind, LinkInfo, PlatformSearchTrack, PlatformTracks, PlaylistConversion,
    TrackConversion, TrackSearchData, TrackSearchResult, TuneError, TuneResult, format_duration,
};

use crate::events::{EventDispatcher, Notifier};
use crate::platform::PlatformRegistry;
use crate::pool::{MatchContext, MatchingPool, PoolConfig, TrackJob, find_match};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Cached,
    FirstConversion,
    Changed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutcome {
    pub conversion: PlaylistConversion,
    pub freshness: Freshness,
    /// The pipeline was cut short; the result is partial and was not snapshotted.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Conversion {
    Track(TrackConversion),
    Playlist(PlaylistConversion),
}

#[derive(Clone)]
pub struct Converter {
    registry: Arc<PlatformRegistry>,
    cache: SnapshotCache,
    locks: Arc<EntityLocks>,
    events: EventDispatcher,
    pool: MatchingPool,
    timeout: Option<Duration>,
}

impl Converter {
    pub fn new(
        registry: Arc<PlatformRegistry>,
        cache: SnapshotCache,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            cache,
            locks: Arc::new(EntityLocks::new()),
            events: EventDispatcher::new(notifier),
            pool: MatchingPool::default(),
            timeout: None,
        }
    }

    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool = MatchingPool::new(config);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub async fn convert(&self, info: &LinkInfo) -> TuneResult<Conversion> {
        match info.entity {
            EntityKind::Track => self.convert_track(info).await.map(Conversion::Track),
            EntityKind::Playlist => self.convert_playlist(info).await.map(Conversion::Playlist),
        }
    }

    #[instrument(skip_all, fields(task_id = %info.task_id, platform = %info.platform, entity_id = %info.entity_id, target = %info.target_platform))]
    pub async fn convert_track(&self, info: &LinkInfo) -> TuneResult<TrackConversion> {
        let source = self.registry.get(&info.platform)?;
        let track = source.search_track_with_id(info).await?;
        let query = TrackSearchData::from(&track);

        let mut platforms = HashMap::new();
        platforms.insert(source.key().to_string(), track);

        if info.wants_all_platforms() {
            let targets = self.registry.others(source.key());
            let searches = targets.iter().map(|target| {
                let query = &query;
                async move {
                    let found = find_match(target.as_ref(), &self.cache, query).await;
                    (target.key().to_string(), found)
                }
            });
            for (platform, found) in join_all(searches).await {
                match found {
                    Ok(Some(track)) => {
                        platforms.insert(platform, track);
                    }
                    Ok(None) => debug!(platform = %platform, "no match on platform"),
                    Err(err) => debug!(platform = %platform, error = %err, "platform search failed"),
                }
            }
        } else {
            if info.target_platform.trim().is_empty() {
                return Err(TuneError::Configuration(
                    "target platform is required for track conversion".to_string(),
                ));
            }
            let target = self.registry.get(&info.target_platform)?;
            let found = find_match(target.as_ref(), &self.cache, &query)
                .await?
                .ok_or_else(|| {
                    TuneError::NotFound(format!("{} has no match for {}", target.key(), query.title))
                })?;
            platforms.insert(target.key().to_string(), found);
        }

        info!(platforms = platforms.len(), "track converted");
        Ok(TrackConversion {
            entity: EntityKind::Track,
            platforms,
        })
    }

    pub async fn convert_playlist(&self, info: &LinkInfo) -> TuneResult<PlaylistConversion> {
        self.convert_playlist_with_status(info, &CancellationToken::new())
            .await
            .map(|outcome| outcome.conversion)
    }

    #[instrument(skip_all, fields(task_id = %info.task_id, platform = %info.platform, entity_id = %info.entity_id, target = %info.target_platform))]
    pub async fn convert_playlist_with_status(
        &self,
        info: &LinkInfo,
        cancel: &CancellationToken,
    ) -> TuneResult<ConversionOutcome> {
        if info.target_platform.trim().is_empty() {
            return Err(TuneError::Configuration(
                "target platform is required for playlist conversion".to_string(),
            ));
        }
        if info.wants_all_platforms() {
            return Err(TuneError::InvalidInput(
                "playlists convert to a single target platform".to_string(),
            ));
        }

        let source = self.registry.get(&info.platform)?;
        let target = self.registry.get(&info.target_platform)?;
        let source_key = source.key().to_string();
        let target_key = target.key().to_string();

        let _lease = self.locks.acquire(&info.entity_id).await;

        let mut meta = source.fetch_playlist_meta_info(info).await?;
        self.events.metadata(info, &meta).await;

        let state = self
            .cache
            .check(&source_key, &info.entity_id, &meta.last_updated, &target_key)
            .await?;
        let freshness = match state {
            SnapshotState::Unchanged(conversion) => {
                info!(marker = %meta.last_updated, "playlist unchanged, serving snapshot");
                self.events.done(info).await;
                return Ok(ConversionOutcome {
                    conversion: *conversion,
                    freshness: Freshness::Cached,
                    cancelled: false,
                });
            }
            SnapshotState::Changed => Freshness::Changed,
            SnapshotState::Missing => Freshness::FirstConversion,
        };

        let (sink, mut stream) = mpsc::channel(self.pool.config().queue_capacity.max(1));
        let collect = async {
            let mut tracks = Vec::new();
            while let Some(track) = stream.recv().await {
                tracks.push(track);
            }
            tracks
        };
        let (fetched, tracks) = tokio::join!(
            source.fetch_tracks_for_source_platform(info, &meta, sink),
            collect
        );
        fetched?;

        if meta.nb_tracks == 0 {
            meta.nb_tracks = tracks.len();
        }
        meta.length = format_duration(total_millis(&tracks));

        let mut conversion = PlaylistConversion::empty(meta);
        if tracks.is_empty() {
            debug!("source playlist is empty");
            conversion
                .platforms
                .insert(target_key.clone(), PlatformTracks {
                    tracks: Vec::new(),
                    length: format_duration(0),
                });
            self.store_snapshot(&source_key, info, &conversion).await;
            self.events.done(info).await;
            return Ok(ConversionOutcome {
                conversion,
                freshness,
                cancelled: false,
            });
        }

        let jobs: Vec<TrackJob> = tracks
            .iter()
            .enumerate()
            .map(|(index, track)| {
                TrackJob::new(
                    PlatformSearchTrack::from(track),
                    index,
                    source_key.as_str(),
                    target_key.as_str(),
                )
            })
            .collect();

        let ctx = MatchContext {
            target,
            cache: self.cache.clone(),
            events: self.events.clone(),
            task_id: info.task_id.clone(),
            app: info.app.clone(),
        };
        let run_token = cancel.child_token();
        let deadline = self.timeout.map(|timeout| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                token.cancel();
            })
        });

        let outcome = self.pool.run(ctx, jobs, run_token).await;
        if let Some(deadline) = deadline {
            deadline.abort();
        }

        conversion.platforms.insert(target_key, PlatformTracks {
            length: format_duration(total_millis(&outcome.matched)),
            tracks: outcome.matched,
        });
        conversion.omitted_tracks = outcome.omitted;

        if outcome.cancelled {
            warn!(
                omitted = conversion.omitted_tracks.len(),
                "playlist conversion cut short, snapshot not updated"
            );
            return Ok(ConversionOutcome {
                conversion,
                freshness,
                cancelled: true,
            });
        }

        self.store_snapshot(&source_key, info, &conversion).await;
        info!(
            matched = conversion.tracks_for(&info.target_platform).len(),
            omitted = conversion.omitted_tracks.len(),
            ?freshness,
            "playlist converted"
        );
        self.events.done(info).await;

        Ok(ConversionOutcome {
            conversion,
            freshness,
            cancelled: false,
        })
    }

    async fn store_snapshot(&self, source_key: &str, info: &LinkInfo, conversion: &PlaylistConversion) {
        let marker = conversion.meta.last_updated.as_str();
        if let Err(err) = self
            .cache
            .store(source_key, &info.entity_id, marker, conversion)
            .await
        {
            // the conversion itself succeeded; the next run simply reconverts
            warn!(error = %err, "failed to store playlist snapshot");
        }
    }
}

fn total_millis(tracks: &[TrackSearchResult]) -> u64 {
    tracks.iter().map(|track| track.duration_millis).sum()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tunebridge_cache::MemoryCacheStore;

    use super::*;
    use crate::events::{BroadcastNotifier, EVENT_PLAYLIST_DONE, NotifierEvent};
    use crate::testing::{ScriptedPlatform, source_track};

    struct Harness {
        spotify: Arc<ScriptedPlatform>,
        deezer: Arc<ScriptedPlatform>,
        tidal: Arc<ScriptedPlatform>,
        bus: BroadcastNotifier,
        converter: Converter,
    }

    fn harness(deezer: ScriptedPlatform) -> Harness {
        let spotify = Arc::new(ScriptedPlatform::new("spotify").with_playlist(
            "rev-1",
            vec![
                source_track("s1", "T1", "Artist"),
                source_track("s2", "T2", "Artist"),
                source_track("s3", "T3", "Artist"),
            ],
        ));
        let deezer = Arc::new(deezer);
        let tidal = Arc::new(ScriptedPlatform::new("tidal").failing("T1"));
        let registry = PlatformRegistry::new()
            .with(spotify.clone())
            .with(deezer.clone())
            .with(tidal.clone());
        let bus = BroadcastNotifier::new(64);
        let converter = Converter::new(
            Arc::new(registry),
            SnapshotCache::new(Arc::new(MemoryCacheStore::new())),
            Arc::new(bus.clone()),
        );
        Harness {
            spotify,
            deezer,
            tidal,
            bus,
            converter,
        }
    }

    fn playlist_info(target: &str) -> LinkInfo {
        LinkInfo {
            platform: "spotify".to_string(),
            target_platform: target.to_string(),
            entity: EntityKind::Playlist,
            entity_id: "p1".to_string(),
            target_link: String::new(),
            task_id: "task-1".to_string(),
            app: "app-1".to_string(),
        }
    }

    fn track_info(target: &str) -> LinkInfo {
        LinkInfo {
            entity: EntityKind::Track,
            entity_id: "s1".to_string(),
            ..playlist_info(target)
        }
    }

    #[tokio::test]
    async fn playlist_requires_target() {
        let h = harness(ScriptedPlatform::new("deezer"));
        let result = h.converter.convert_playlist(&playlist_info("")).await;
        assert!(matches!(result, Err(TuneError::Configuration(_))));
    }

    #[tokio::test]
    async fn unknown_target_aborts() {
        let h = harness(ScriptedPlatform::new("deezer"));
        let result = h.converter.convert_playlist(&playlist_info("napster")).await;
        assert!(matches!(result, Err(TuneError::UnsupportedPlatform(_))));
    }

    #[tokio::test]
    async fn failed_track_is_omitted_and_order_kept() {
        let h = harness(ScriptedPlatform::new("deezer").failing("T2"));
        let conversion = h.converter.convert_playlist(&playlist_info("deezer")).await.unwrap();

        let titles: Vec<&str> = conversion
            .tracks_for("deezer")
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(titles, vec!["T1", "T3"]);
        assert_eq!(conversion.omitted_tracks.len(), 1);
        assert_eq!(conversion.omitted_tracks[0].title, "T2");
        assert_eq!(conversion.omitted_tracks[0].index, 2);
        assert_eq!(conversion.meta.length, "9:00");
        assert_eq!(conversion.platforms["deezer"].length, "6:40");
        assert_eq!(conversion.meta.nb_tracks, 3);
    }

    #[tokio::test]
    async fn unchanged_marker_serves_snapshot_without_upstream_calls() {
        let h = harness(ScriptedPlatform::new("deezer"));
        let info = playlist_info("deezer");
        let cancel = CancellationToken::new();

        let first = h.converter.convert_playlist_with_status(&info, &cancel).await.unwrap();
        assert_eq!(first.freshness, Freshness::FirstConversion);
        assert_eq!(h.deezer.title_calls.load(Ordering::SeqCst), 3);

        let second = h.converter.convert_playlist_with_status(&info, &cancel).await.unwrap();
        assert_eq!(second.freshness, Freshness::Cached);
        assert_eq!(second.conversion, first.conversion);
        assert_eq!(h.deezer.title_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.spotify.track_streams.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_conversions_of_one_entity_match_once() {
        let h = harness(ScriptedPlatform::new("deezer").with_delay("T1", Duration::from_millis(20)));
        let info = playlist_info("deezer");
        let cancel = CancellationToken::new();

        let (a, b) = tokio::join!(
            h.converter.convert_playlist_with_status(&info, &cancel),
            h.converter.convert_playlist_with_status(&info, &cancel)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        let mut freshness = vec![a.freshness, b.freshness];
        freshness.sort_by_key(|f| *f == Freshness::Cached);
        assert_eq!(freshness, vec![Freshness::FirstConversion, Freshness::Cached]);
        assert_eq!(a.conversion, b.conversion);
        assert_eq!(h.deezer.title_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.spotify.track_streams.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn moved_marker_reconverts() {
        let h = harness(ScriptedPlatform::new("deezer"));
        let info = playlist_info("deezer");
        let cancel = CancellationToken::new();
        h.converter.convert_playlist_with_status(&info, &cancel).await.unwrap();

        h.spotify.set_playlist(
            "rev-2",
            vec![
                source_track("s3", "T3", "Artist"),
                source_track("s4", "T4", "Artist"),
            ],
        );
        let outcome = h.converter.convert_playlist_with_status(&info, &cancel).await.unwrap();
        assert_eq!(outcome.freshness, Freshness::Changed);
        let titles: Vec<&str> = outcome
            .conversion
            .tracks_for("deezer")
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(titles, vec!["T3", "T4"]);
        // T3 came from the track cache
        assert_eq!(h.deezer.title_calls.load(Ordering::SeqCst), 4);
        assert_eq!(h.spotify.track_streams.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_playlist_is_an_empty_result() {
        let h = harness(ScriptedPlatform::new("deezer"));
        h.spotify.set_playlist("rev-1", Vec::new());
        let conversion = h.converter.convert_playlist(&playlist_info("deezer")).await.unwrap();
        assert!(conversion.tracks_for("deezer").is_empty());
        assert!(conversion.omitted_tracks.is_empty());
        assert_eq!(h.deezer.title_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn emits_metadata_tracks_and_done() {
        let h = harness(ScriptedPlatform::new("deezer").failing("T3"));
        let mut rx = h.bus.subscribe();
        h.converter.convert_playlist(&playlist_info("deezer")).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(NotifierEvent::Metadata { .. })));
        let tracks = events
            .iter()
            .filter(|event| matches!(event, NotifierEvent::Track { .. }))
            .count();
        assert_eq!(tracks, 2);
        assert_eq!(events.last().map(|e| e.event_type()), Some(EVENT_PLAYLIST_DONE));
    }

    #[tokio::test]
    async fn deadline_returns_partial_result_without_snapshot() {
        let h = harness(ScriptedPlatform::new("deezer").hanging("T2"));
        let converter = h
            .converter
            .clone()
            .with_timeout(Some(Duration::from_millis(50)));
        let info = playlist_info("deezer");

        let outcome = converter
            .convert_playlist_with_status(&info, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.cancelled);
        let conversion = &outcome.conversion;
        assert_eq!(
            conversion.tracks_for("deezer").len() + conversion.omitted_tracks.len(),
            3
        );
        assert!(conversion.omitted_tracks.iter().any(|t| t.index == 2));

        let again = converter
            .convert_playlist_with_status(&info, &CancellationToken::new())
            .await
            .unwrap();
        assert_ne!(again.freshness, Freshness::Cached);
    }

    #[tokio::test]
    async fn track_to_single_target() {
        let h = harness(ScriptedPlatform::new("deezer"));
        let conversion = h.converter.convert_track(&track_info("deezer")).await.unwrap();
        assert_eq!(conversion.entity, EntityKind::Track);
        assert_eq!(conversion.platforms["deezer"].title, "T1");
        assert!(conversion.platforms.contains_key("spotify"));
    }

    #[tokio::test]
    async fn track_to_all_drops_failing_platforms() {
        let h = harness(ScriptedPlatform::new("deezer"));
        let conversion = h.converter.convert_track(&track_info("all")).await.unwrap();
        let mut keys: Vec<&str> = conversion.platforms.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["deezer", "spotify"]);
        assert_eq!(h.tidal.title_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn track_single_target_failure_propagates() {
        let h = harness(ScriptedPlatform::new("deezer").failing("T1"));
        let result = h.converter.convert_track(&track_info("deezer")).await;
        assert!(matches!(result, Err(TuneError::NotFound(_))));
    }
}
