use async_trait::async_trait;
use tunebridge_core::{EntityKind, LinkInfo, TuneError, TuneResult, new_task_id, validate_url};

use crate::parsers::{parse_apple_music_link, parse_deezer_link, parse_spotify_link};

#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> TuneResult<LinkInfo>;
}

#[derive(Debug, Clone, Default)]
pub struct UrlLinkResolver;

type LinkParser = fn(&str) -> Option<(EntityKind, String)>;

const PARSERS: [(&str, LinkParser); 3] = [
    ("spotify", parse_spotify_link),
    ("applemusic", parse_apple_music_link),
    ("deezer", parse_deezer_link),
];

impl UrlLinkResolver {
    pub fn resolve_sync(&self, url: &str) -> TuneResult<LinkInfo> {
        validate_url(url)?;
        PARSERS
            .iter()
            .find_map(|(platform, parse)| {
                parse(url).map(|(entity, entity_id)| LinkInfo {
                    platform: platform.to_string(),
                    target_platform: String::new(),
                    entity,
                    entity_id,
                    target_link: url.to_string(),
                    task_id: new_task_id(),
                    app: String::new(),
                })
            })
            .ok_or_else(|| TuneError::InvalidInput(format!("unrecognized link: {url}")))
    }
}

#[async_trait]
impl LinkResolver for UrlLinkResolver {
    async fn resolve(&self, url: &str) -> TuneResult<LinkInfo> {
        self.resolve_sync(url)
    }
}
