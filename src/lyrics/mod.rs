//! Timed lyrics: LRC parsing and the LRCLIB provider.

mod lrc;
mod provider;

pub use lrc::parse_lrc;
pub use lrc::parse_plain;
pub use lrc::parse_timestamp;
pub use provider::LyricsLookup;
pub use provider::LyricsProvider;
pub use provider::interpret;
pub use provider::lyrics_cache_key;
