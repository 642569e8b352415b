use regex::Regex;
use tunebridge_core::EntityKind;

pub fn parse_deezer_link(input: &str) -> Option<(EntityKind, String)> {
    let regex = Regex::new(r"deezer\.com/(?:[a-z]{2}/)?(track|playlist)/(\d+)").ok()?;
    let captures = regex.captures(input)?;
    let entity = match captures.get(1)?.as_str() {
        "track" => EntityKind::Track,
        _ => EntityKind::Playlist,
    };
    captures.get(2).map(|m| (entity, m.as_str().to_string()))
}
