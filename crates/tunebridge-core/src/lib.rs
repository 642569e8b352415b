mod error;
mod model;

pub use error::{TuneError, TuneResult};
pub use model::{
    EntityKind, LinkInfo, OmittedTrack, PlatformSearchTrack, PlatformTracks, PlaylistConversion,
    PlaylistMetadata, TARGET_ALL, TrackConversion, TrackSearchData, TrackSearchResult,
};

pub fn validate_url(url: &str) -> TuneResult<()> {
    url::Url::parse(url).map_err(|err| TuneError::InvalidInput(format!("invalid url: {err}")))?;
    Ok(())
}

pub fn normalize_key_part(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Formats a duration as `H:MM:SS`, or `M:SS` when under an hour.
pub fn format_duration(millis: u64) -> String {
    let total_secs = millis / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::{format_duration, normalize_key_part, validate_url};
    use crate::TuneError;

    #[test]
    fn test_validate_url_valid_https() {
        assert!(validate_url("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M").is_ok());
        assert!(validate_url("https://www.deezer.com/en/track/3135556").is_ok());
    }

    #[test]
    fn test_validate_url_invalid() {
        let result = validate_url("not-a-url");
        assert!(matches!(result, Err(TuneError::InvalidInput(_))));
    }

    #[test]
    fn test_validate_url_error_message() {
        let result = validate_url("://no-scheme");
        match result {
            Err(TuneError::InvalidInput(msg)) => assert!(msg.contains("invalid url")),
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[test]
    fn normalizes_punctuation_and_case() {
        assert_eq!(normalize_key_part("The Weeknd"), "theweeknd");
        assert_eq!(normalize_key_part("  Don't Stop Me Now! "), "dontstopmenow");
        assert_eq!(normalize_key_part("Beyoncé"), "beyoncé");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(200_040), "3:20");
        assert_eq!(format_duration(3_725_000), "1:02:05");
    }
}
