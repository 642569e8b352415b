use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tunebridge_core::{
    LinkInfo, PlaylistMetadata, TrackSearchData, TrackSearchResult, TuneError, TuneResult,
};

use crate::platform::PlatformService;

pub fn source_track(id: &str, title: &str, artist: &str) -> TrackSearchResult {
    TrackSearchResult {
        url: format!("https://spotify.test/{id}"),
        title: title.to_string(),
        artists: vec![artist.to_string()],
        duration_millis: 180_000,
        id: id.to_string(),
        ..Default::default()
    }
}

pub struct ScriptedPlatform {
    key: String,
    playlist: Mutex<Vec<TrackSearchResult>>,
    meta: Mutex<PlaylistMetadata>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub title_calls: AtomicUsize,
    pub track_streams: AtomicUsize,
}

impl ScriptedPlatform {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            playlist: Mutex::new(Vec::new()),
            meta: Mutex::new(PlaylistMetadata::default()),
            failing: HashSet::new(),
            hanging: HashSet::new(),
            delays: HashMap::new(),
            title_calls: AtomicUsize::new(0),
            track_streams: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, title: &str) -> Self {
        self.failing.insert(title.to_string());
        self
    }

    pub fn hanging(mut self, title: &str) -> Self {
        self.hanging.insert(title.to_string());
        self
    }

    pub fn with_delay(mut self, title: &str, delay: Duration) -> Self {
        self.delays.insert(title.to_string(), delay);
        self
    }

    pub fn with_playlist(self, marker: &str, tracks: Vec<TrackSearchResult>) -> Self {
        self.set_playlist(marker, tracks);
        self
    }

    pub fn set_playlist(&self, marker: &str, tracks: Vec<TrackSearchResult>) {
        let mut meta = self.meta.lock().unwrap();
        meta.title = "Scripted".to_string();
        meta.url = format!("https://{}.test/playlist/p1", self.key);
        meta.nb_tracks = tracks.len();
        meta.last_updated = marker.to_string();
        *self.playlist.lock().unwrap() = tracks;
    }
}

#[async_trait]
impl PlatformService for ScriptedPlatform {
    fn key(&self) -> &str {
        &self.key
    }

    async fn search_track_with_id(&self, info: &LinkInfo) -> TuneResult<TrackSearchResult> {
        self.playlist
            .lock()
            .unwrap()
            .iter()
            .find(|track| track.id == info.entity_id)
            .cloned()
            .ok_or_else(|| TuneError::NotFound(info.entity_id.clone()))
    }

    async fn search_track_with_title(
        &self,
        query: &TrackSearchData,
    ) -> TuneResult<TrackSearchResult> {
        self.title_calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(&query.title) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delays.get(&query.title) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&query.title) {
            return Err(TuneError::NotFound(query.title.clone()));
        }
        Ok(TrackSearchResult {
            url: format!("https://{}.test/{}", self.key, query.title),
            title: query.title.clone(),
            artists: query.artists.clone(),
            duration_millis: 200_000,
            id: format!("{}-{}", self.key, query.title),
            ..Default::default()
        })
    }

    async fn fetch_playlist_meta_info(&self, _info: &LinkInfo) -> TuneResult<PlaylistMetadata> {
        Ok(self.meta.lock().unwrap().clone())
    }

    async fn fetch_tracks_for_source_platform(
        &self,
        _info: &LinkInfo,
        _meta: &PlaylistMetadata,
        sink: mpsc::Sender<TrackSearchResult>,
    ) -> TuneResult<()> {
        self.track_streams.fetch_add(1, Ordering::SeqCst);
        let tracks = self.playlist.lock().unwrap().clone();
        for track in tracks {
            if sink.send(track).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}
