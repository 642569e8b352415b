use regex::Regex;
use tunebridge_core::EntityKind;

pub fn parse_spotify_link(input: &str) -> Option<(EntityKind, String)> {
    let regex =
        Regex::new(r"open\.spotify\.com/(?:intl-[a-z]{2}/)?(track|playlist)/([A-Za-z0-9]+)").ok()?;
    let captures = regex.captures(input)?;
    let entity = match captures.get(1)?.as_str() {
        "track" => EntityKind::Track,
        _ => EntityKind::Playlist,
    };
    captures.get(2).map(|m| (entity, m.as_str().to_string()))
}
