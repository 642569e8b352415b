use regex::Regex;
use tunebridge_core::EntityKind;
use url::Url;

pub fn parse_apple_music_link(input: &str) -> Option<(EntityKind, String)> {
    let url = Url::parse(input).ok()?;
    if url.domain()? != "music.apple.com" {
        return None;
    }
    let query_pairs = url.query_pairs().collect::<Vec<_>>();
    if let Some((_, value)) = query_pairs.iter().find(|(key, _)| key == "i") {
        return Some((EntityKind::Track, value.to_string()));
    }

    let playlist = Regex::new(r"music\.apple\.com/.*/playlist/(?:.+/)?(pl\.[A-Za-z0-9\-]+)").ok()?;
    if let Some(captures) = playlist.captures(input) {
        return captures
            .get(1)
            .map(|m| (EntityKind::Playlist, m.as_str().to_string()));
    }

    let song = Regex::new(r"music\.apple\.com/.*/song/.+/(\d+)").ok()?;
    let captures = song.captures(input)?;
    captures
        .get(1)
        .map(|m| (EntityKind::Track, m.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::parse_apple_music_link;
    use tunebridge_core::EntityKind;

    #[test]
    fn parses_apple_music_track_id_from_query() {
        let url = "https://music.apple.com/us/album/blinding-lights/1496794033?i=1496794038";
        assert_eq!(
            parse_apple_music_link(url),
            Some((EntityKind::Track, "1496794038".to_string()))
        );
    }

    #[test]
    fn parses_apple_music_playlist() {
        let url = "https://music.apple.com/us/playlist/todays-hits/pl.f4d106fed2bd41149aaacabb233eb5eb";
        assert_eq!(
            parse_apple_music_link(url),
            Some((
                EntityKind::Playlist,
                "pl.f4d106fed2bd41149aaacabb233eb5eb".to_string()
            ))
        );
    }

    #[test]
    fn rejects_other_domains() {
        assert_eq!(parse_apple_music_link("https://example.com/?i=1"), None);
    }
}
