mod apple_music;
mod deezer;
mod spotify;

pub use apple_music::parse_apple_music_link;
pub use deezer::parse_deezer_link;
pub use spotify::parse_spotify_link;
