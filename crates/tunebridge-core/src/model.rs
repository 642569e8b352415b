use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const TARGET_ALL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Track,
    Playlist,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Playlist => "playlist",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub platform: String,
    #[serde(default)]
    pub target_platform: String,
    pub entity: EntityKind,
    pub entity_id: String,
    #[serde(default)]
    pub target_link: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub app: String,
}

impl LinkInfo {
    pub fn wants_all_platforms(&self) -> bool {
        self.target_platform.eq_ignore_ascii_case(TARGET_ALL)
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_platform = target.into();
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSearchResult {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub duration_millis: u64,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub released: String,
    #[serde(default)]
    pub cover: String,
    pub id: String,
}

impl TrackSearchResult {
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistMetadata {
    pub title: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub cover: String,
    pub url: String,
    #[serde(default)]
    pub length: String,
    #[serde(default)]
    pub nb_tracks: usize,
    /// Change-detection marker: a timestamp or revision token set by the source platform.
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformSearchTrack {
    pub title: String,
    pub artists: Vec<String>,
    pub url: String,
    pub id: String,
}

impl From<&TrackSearchResult> for PlatformSearchTrack {
    fn from(track: &TrackSearchResult) -> Self {
        Self {
            title: track.title.clone(),
            artists: track.artists.clone(),
            url: track.url.clone(),
            id: track.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSearchData {
    pub title: String,
    pub artists: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

impl From<&PlatformSearchTrack> for TrackSearchData {
    fn from(track: &PlatformSearchTrack) -> Self {
        Self {
            title: track.title.clone(),
            artists: track.artists.clone(),
            album: None,
        }
    }
}

impl From<&TrackSearchResult> for TrackSearchData {
    fn from(track: &TrackSearchResult) -> Self {
        Self {
            title: track.title.clone(),
            artists: track.artists.clone(),
            album: (!track.album.is_empty()).then(|| track.album.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmittedTrack {
    pub title: String,
    pub artists: Vec<String>,
    pub url: String,
    pub platform: String,
    /// 1-based position in the source playlist.
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformTracks {
    pub tracks: Vec<TrackSearchResult>,
    pub length: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistConversion {
    pub entity: EntityKind,
    pub meta: PlaylistMetadata,
    pub platforms: HashMap<String, PlatformTracks>,
    #[serde(default)]
    pub omitted_tracks: Vec<OmittedTrack>,
}

impl PlaylistConversion {
    pub fn empty(meta: PlaylistMetadata) -> Self {
        Self {
            entity: EntityKind::Playlist,
            meta,
            platforms: HashMap::new(),
            omitted_tracks: Vec::new(),
        }
    }

    pub fn tracks_for(&self, platform: &str) -> &[TrackSearchResult] {
        self.platforms
            .get(platform)
            .map(|result| result.tracks.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackConversion {
    pub entity: EntityKind,
    pub platforms: HashMap<String, TrackSearchResult>,
}
