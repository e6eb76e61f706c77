//! lyricsync library
//!
//! Follows Spotify playback and maps the playback position onto timed lyrics.
//! The crate is split into the pieces a front end wires together:
//!
//! # Modules
//!
//! - `api` - HTTP handlers for the local OAuth callback server
//! - `cli` - Command-line interface implementations
//! - `config` - `.env` loading and typed settings
//! - `error` - Error taxonomy shared by every layer
//! - `lyrics` - LRC parsing and the LRCLIB lyrics provider
//! - `management` - Token store and the rate-limited request cache
//! - `server` - Local HTTP server for OAuth callbacks
//! - `spotify` - PKCE auth flow, Web API client and playback monitor
//! - `sync` - Position to lyric line/word synchronization
//! - `types` - Data structures and wire types
//! - `utils` - PKCE helpers, clocks and text normalization
//!
//! # Example
//!
//! ```
//! use lyricsync::{config, cli};
//!
//! #[tokio::main]
//! async fn main() -> lyricsync::Res<()> {
//!     config::load_env().await?;
//!     let settings = config::Settings::from_env()?;
//!     cli::status(&settings).await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod lyrics;
pub mod management;
pub mod server;
pub mod spotify;
pub mod sync;
pub mod types;
pub mod utils;

/// A convenient Result type alias for top-level plumbing.
///
/// Library operations return [`error::Result`]; this boxed alias is used
/// where errors of several origins meet, such as the binary's startup.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Waiting for playback...");
/// info!("Found {} lines", count);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Only the command-line layer uses this macro; library code returns errors
/// instead of terminating the process.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a dimmed diagnostic line when `LYRICSYNC_DEBUG` is set.
///
/// Used for request/cache chatter that would drown the `watch` output.
#[macro_export]
macro_rules! debug {
  ($($arg:tt)*) => ({
    if std::env::var_os("LYRICSYNC_DEBUG").is_some() {
      use colored::Colorize;
      eprintln!("[{}] {}", "~".dimmed(), std::format_args!($($arg)*));
    }
  })
}
