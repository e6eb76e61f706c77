use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// OAuth token pair as persisted in the token store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry in epoch milliseconds.
    pub expires_at: i64,
    pub scope: Vec<String>,
}

impl AuthToken {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Verifier and nonce kept between `begin_login` and the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceSession {
    pub verifier: String,
    pub state: String,
    pub created_at: i64,
}

/// Token endpoint success body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token endpoint error body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
}

impl TrackInfo {
    /// First credited artist, used for lyrics lookups.
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or_default()
    }
}

/// Immutable point-in-time read of the player.
///
/// `position_ms` is the progress reported at `fetched_at_ms`; use
/// [`PlaybackSnapshot::position_at`] for the position at a later instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub track: Option<TrackInfo>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub fetched_at_ms: i64,
}

impl PlaybackSnapshot {
    pub fn track_id(&self) -> Option<&str> {
        self.track.as_ref().map(|t| t.id.as_str())
    }

    /// Position extrapolated to `now_ms`, clamped to the track duration.
    pub fn position_at(&self, now_ms: i64) -> u64 {
        if !self.is_playing {
            return self.position_ms;
        }
        let elapsed = now_ms.saturating_sub(self.fetched_at_ms).max(0) as u64;
        let position = self.position_ms.saturating_add(elapsed);
        if self.duration_ms > 0 {
            position.min(self.duration_ms)
        } else {
            position
        }
    }
}

/// `GET /me/player` body. Only the fields the client reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerResponse {
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub item: Option<PlayerItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerItem {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<PlayerArtist>,
    #[serde(default)]
    pub album: Option<PlayerAlbum>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerArtist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerAlbum {
    pub name: String,
}

impl PlayerResponse {
    pub fn into_snapshot(self, fetched_at_ms: i64) -> PlaybackSnapshot {
        let duration_ms = self.item.as_ref().map_or(0, |i| i.duration_ms);
        let track = self.item.map(|item| TrackInfo {
            id: item.id.unwrap_or_default(),
            name: item.name,
            artists: item.artists.into_iter().map(|a| a.name).collect(),
            album: item.album.map(|a| a.name),
        });

        PlaybackSnapshot {
            is_playing: self.is_playing,
            track,
            position_ms: self.progress_ms.unwrap_or(0),
            duration_ms,
            fetched_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricWord {
    pub time_ms: u64,
    pub text: String,
    pub end_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricLine {
    pub time_ms: u64,
    pub text: String,
    pub words: Option<Vec<LyricWord>>,
}

/// Parsed lyrics. `lines` is sorted by `time_ms`, and so is every `words`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LyricsDocument {
    pub lines: Vec<LyricLine>,
    pub synced: bool,
    pub has_word_timestamps: bool,
}

impl LyricsDocument {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// LRCLIB `/api/get` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LrclibResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub instrumental: bool,
    #[serde(default)]
    pub plain_lyrics: Option<String>,
    #[serde(default)]
    pub synced_lyrics: Option<String>,
}

/// Engine output for one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncResult {
    pub current_line_index: Option<usize>,
    pub current_line: Option<LyricLine>,
    pub current_word_index: Option<usize>,
    pub is_paused: bool,
    /// Elapsed fraction (0.0..=1.0) of the current line.
    pub line_progress: Option<f64>,
}

#[derive(Tabled)]
pub struct LyricTableRow {
    pub time: String,
    pub text: String,
}

#[derive(Tabled)]
pub struct PlaybackTableRow {
    pub state: String,
    pub track: String,
    pub artists: String,
    pub position: String,
}
