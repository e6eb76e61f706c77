//! # CLI Module
//!
//! The command-line layer of lyricsync. Each public function here backs one
//! subcommand of the binary: it builds the components it needs from
//! [`crate::config::Settings`], talks to them, and turns the outcome into
//! console output through the crate's logging macros.
//!
//! ## Commands
//!
//! ### Session
//!
//! - [`auth`] - Runs the PKCE login: starts the local callback server, opens
//!   the authorize page and waits for the redirect
//! - [`logout`] - Forgets the stored session
//!
//! ### Playback
//!
//! - [`status`] - Shows the current playback as a table
//! - [`control`] - Play, pause, toggle, skip and seek
//! - [`watch`] - Follows playback and prints the lyric line being sung
//!
//! ### Lyrics
//!
//! - [`lyrics`] - Looks up and prints timed lyrics for an artist and title
//!
//! ## Architecture
//!
//! ```text
//! CLI Layer (console output, exits on fatal errors)
//!     ↓
//! SyncEngine / PlaybackMonitor
//!     ↓
//! SpotifyApiClient / LyricsProvider (RateLimitedCache)
//!     ↓
//! AuthFlow (TokenStore)
//! ```
//!
//! Only this layer terminates the process. Everything below returns
//! [`crate::error::Error`] values, and the commands map them to messages:
//! errors that need a new login point the user at `lyricsync auth`, rate
//! limits report when to retry.
//!
//! ## Usage Patterns
//!
//! ```bash
//! lyricsync auth                       # Log in with Spotify
//! lyricsync watch                      # Follow playback with lyrics
//! lyricsync status                     # What is playing right now
//! lyricsync lyrics --artist Queen --title "Bohemian Rhapsody"
//! lyricsync seek 60000                 # Jump to 1:00
//! ```

mod auth;
mod lyrics;
mod playback;
mod session;
mod watch;

pub use auth::{auth, logout};
pub use lyrics::{lyric_rows, lyrics};
pub use playback::{PlayerCommand, control, playback_row, status};
pub use session::{Session, open_session};
pub use watch::watch;
