mod catalog;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tunebridge_core::{
    LinkInfo, PlaylistMetadata, TrackSearchData, TrackSearchResult, TuneError, TuneResult,
};

pub use catalog::{Catalog, CatalogPlatform, CatalogPlaylist, PlatformCatalog};

#[async_trait]
pub trait PlatformService: Send + Sync {
    fn key(&self) -> &str;

    async fn search_track_with_id(&self, info: &LinkInfo) -> TuneResult<TrackSearchResult>;

    async fn search_track_with_title(&self, query: &TrackSearchData)
    -> TuneResult<TrackSearchResult>;

    async fn fetch_playlist_meta_info(&self, info: &LinkInfo) -> TuneResult<PlaylistMetadata>;

    /// Implementations stop early without error when the receiver is gone.
    async fn fetch_tracks_for_source_platform(
        &self,
        info: &LinkInfo,
        meta: &PlaylistMetadata,
        sink: mpsc::Sender<TrackSearchResult>,
    ) -> TuneResult<()>;
}

pub fn canonical_platform(input: &str) -> Option<&'static str> {
    let normalized = input.trim().to_lowercase();
    match normalized.as_str() {
        "spotify" => Some("spotify"),
        "applemusic" | "apple-music" | "apple_music" => Some("applemusic"),
        "deezer" => Some("deezer"),
        "tidal" => Some("tidal"),
        "ytmusic" | "youtubemusic" | "youtube-music" | "youtube_music" => Some("ytmusic"),
        _ => None,
    }
}

pub fn display_name(key: &str) -> &str {
    match key {
        "spotify" => "Spotify",
        "applemusic" => "Apple Music",
        "deezer" => "Deezer",
        "tidal" => "Tidal",
        "ytmusic" => "YouTube Music",
        _ => key,
    }
}

#[derive(Clone, Default)]
pub struct PlatformRegistry {
    services: HashMap<String, Arc<dyn PlatformService>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: Arc<dyn PlatformService>) {
        self.services.insert(service.key().to_string(), service);
    }

    pub fn with(mut self, service: Arc<dyn PlatformService>) -> Self {
        self.register(service);
        self
    }

    fn lookup_key(key: &str) -> String {
        canonical_platform(key)
            .map(str::to_string)
            .unwrap_or_else(|| key.trim().to_lowercase())
    }

    pub fn get(&self, key: &str) -> TuneResult<Arc<dyn PlatformService>> {
        self.services
            .get(&Self::lookup_key(key))
            .cloned()
            .ok_or_else(|| TuneError::UnsupportedPlatform(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.services.contains_key(&Self::lookup_key(key))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.services.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn others(&self, key: &str) -> Vec<Arc<dyn PlatformService>> {
        let excluded = Self::lookup_key(key);
        self.keys()
            .into_iter()
            .filter(|candidate| *candidate != excluded)
            .filter_map(|candidate| self.services.get(&candidate).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PlatformRegistry {
        PlatformRegistry::new()
            .with(Arc::new(CatalogPlatform::in_memory("spotify", Catalog::default())))
            .with(Arc::new(CatalogPlatform::in_memory("deezer", Catalog::default())))
            .with(Arc::new(CatalogPlatform::in_memory("tidal", Catalog::default())))
    }

    #[test]
    fn canonical_platform_maps_common_inputs() {
        assert_eq!(canonical_platform("Spotify"), Some("spotify"));
        assert_eq!(canonical_platform("apple-music"), Some("applemusic"));
        assert_eq!(canonical_platform("youtube_music"), Some("ytmusic"));
        assert_eq!(canonical_platform("napster"), None);
    }

    #[test]
    fn get_resolves_aliases_and_rejects_unknown() {
        let registry = registry();
        assert_eq!(registry.get("DEEZER").unwrap().key(), "deezer");
        assert!(matches!(
            registry.get("napster"),
            Err(TuneError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn others_excludes_source_in_key_order() {
        let registry = registry();
        let others: Vec<String> = registry
            .others("spotify")
            .iter()
            .map(|service| service.key().to_string())
            .collect();
        assert_eq!(others, vec!["deezer".to_string(), "tidal".to_string()]);
    }
}
