use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use tunebridge_core::{
    LinkInfo, PlaylistMetadata, TrackSearchData, TrackSearchResult, TuneError, TuneResult,
    normalize_key_part,
};

use super::PlatformService;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub platforms: HashMap<String, PlatformCatalog>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformCatalog {
    #[serde(default)]
    pub tracks: Vec<TrackSearchResult>,
    #[serde(default)]
    pub playlists: Vec<CatalogPlaylist>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogPlaylist {
    pub id: String,
    pub meta: PlaylistMetadata,
    #[serde(default)]
    pub tracks: Vec<String>,
}

impl Catalog {
    pub async fn load(path: &Path) -> TuneResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|err| {
            TuneError::Configuration(format!(
                "failed to read catalog {}: {err}",
                path.display()
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> TuneResult<Self> {
        serde_json::from_str(content)
            .map_err(|err| TuneError::Serialization(format!("catalog parse failed: {err}")))
    }

    pub fn platform_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.platforms.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[derive(Debug, Clone)]
enum CatalogSource {
    File(PathBuf),
    Shared(Arc<RwLock<Catalog>>),
}

#[derive(Debug, Clone)]
pub struct CatalogPlatform {
    key: String,
    source: CatalogSource,
}

impl CatalogPlatform {
    pub fn from_file(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            source: CatalogSource::File(path.into()),
        }
    }

    pub fn shared(key: impl Into<String>, catalog: Arc<RwLock<Catalog>>) -> Self {
        Self {
            key: key.into(),
            source: CatalogSource::Shared(catalog),
        }
    }

    pub fn in_memory(key: impl Into<String>, catalog: Catalog) -> Self {
        Self::shared(key, Arc::new(RwLock::new(catalog)))
    }

    async fn section(&self) -> TuneResult<PlatformCatalog> {
        let section = match &self.source {
            CatalogSource::File(path) => Catalog::load(path).await?.platforms.remove(&self.key),
            CatalogSource::Shared(catalog) => catalog.read().await.platforms.get(&self.key).cloned(),
        };
        Ok(section.unwrap_or_default())
    }

    async fn playlist(&self, entity_id: &str) -> TuneResult<(PlatformCatalog, CatalogPlaylist)> {
        let section = self.section().await?;
        let playlist = section
            .playlists
            .iter()
            .find(|playlist| playlist.id == entity_id)
            .cloned()
            .ok_or_else(|| {
                TuneError::NotFound(format!("{} playlist {entity_id}", self.key))
            })?;
        Ok((section, playlist))
    }
}

fn matches_query(track: &TrackSearchResult, query: &TrackSearchData) -> bool {
    if normalize_key_part(&track.title) != normalize_key_part(&query.title) {
        return false;
    }
    if query.artists.is_empty() {
        return true;
    }
    let wanted: Vec<String> = query.artists.iter().map(|a| normalize_key_part(a)).collect();
    track
        .artists
        .iter()
        .any(|artist| wanted.contains(&normalize_key_part(artist)))
}

#[async_trait]
impl PlatformService for CatalogPlatform {
    fn key(&self) -> &str {
        &self.key
    }

    async fn search_track_with_id(&self, info: &LinkInfo) -> TuneResult<TrackSearchResult> {
        self.section()
            .await?
            .tracks
            .into_iter()
            .find(|track| track.id == info.entity_id)
            .ok_or_else(|| TuneError::NotFound(format!("{} track {}", self.key, info.entity_id)))
    }

    async fn search_track_with_title(
        &self,
        query: &TrackSearchData,
    ) -> TuneResult<TrackSearchResult> {
        self.section()
            .await?
            .tracks
            .into_iter()
            .find(|track| matches_query(track, query))
            .ok_or_else(|| {
                TuneError::NotFound(format!(
                    "{} has no match for {} - {}",
                    self.key,
                    query.artists.join(", "),
                    query.title
                ))
            })
    }

    async fn fetch_playlist_meta_info(&self, info: &LinkInfo) -> TuneResult<PlaylistMetadata> {
        let (_, playlist) = self.playlist(&info.entity_id).await?;
        let mut meta = playlist.meta;
        if meta.nb_tracks == 0 {
            meta.nb_tracks = playlist.tracks.len();
        }
        Ok(meta)
    }

    async fn fetch_tracks_for_source_platform(
        &self,
        info: &LinkInfo,
        _meta: &PlaylistMetadata,
        sink: mpsc::Sender<TrackSearchResult>,
    ) -> TuneResult<()> {
        let (section, playlist) = self.playlist(&info.entity_id).await?;
        let by_id: HashMap<&str, &TrackSearchResult> = section
            .tracks
            .iter()
            .map(|track| (track.id.as_str(), track))
            .collect();

        for track_id in &playlist.tracks {
            let Some(track) = by_id.get(track_id.as_str()) else {
                warn!(platform = %self.key, track_id, "catalog playlist references unknown track");
                continue;
            };
            if sink.send((*track).clone()).await.is_err() {
                debug!(platform = %self.key, "track sink closed, stopping stream");
                break;
            }
        }
        Ok(())
    }
}
