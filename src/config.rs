//! Configuration management for lyricsync.
//!
//! Values come from environment variables, optionally seeded from a `.env`
//! file in the local data directory. [`Settings::from_env`] turns them into one
//! typed struct that is passed to the components that need it, so nothing
//! below the command-line layer reads the environment on its own.
//!
//! Resolution order:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Built-in defaults (everything except the client id)

use std::{env, path::PathBuf, time::Duration};

use crate::{debug, error::Error};

pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_LRCLIB_URL: &str = "https://lrclib.net/api";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8888";
pub const DEFAULT_SCOPE: &str = "user-read-playback-state user-modify-playback-state";

/// Loads environment variables from `<data_local_dir>/lyricsync/.env`.
///
/// Creates the directory when it does not exist yet. A missing `.env` file is
/// not an error since every value can also come from the process environment.
///
/// # Directory Structure
///
/// - Linux: `~/.local/share/lyricsync/.env`
/// - macOS: `~/Library/Application Support/lyricsync/.env`
/// - Windows: `%LOCALAPPDATA%/lyricsync/.env`
pub async fn load_env() -> Result<(), String> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    } else {
        debug!("no .env at {}, using process environment", path.display());
    }
    Ok(())
}

/// Platform local data directory of the application.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("lyricsync");
    path
}

/// OAuth client registration and endpoints used by the PKCE flow.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Refresh this long before the provider-reported expiry.
    pub expiry_skew: Duration,
    /// How long a pending PKCE session stays redeemable.
    pub session_ttl: Duration,
}

impl AuthSettings {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: DEFAULT_SCOPE.to_string(),
            authorize_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            expiry_skew: Duration::from_secs(60),
            session_ttl: Duration::from_secs(600),
        }
    }
}

/// Everything the application needs at runtime.
#[derive(Debug, Clone)]
pub struct Settings {
    pub auth: AuthSettings,
    pub api_url: String,
    pub lyrics_url: String,
    pub server_address: String,
    pub poll_interval: Duration,
    pub playback_cache_ttl: Duration,
    pub lyrics_cache_ttl: Duration,
    pub pause_tolerance_ms: u64,
}

impl Settings {
    /// Builds settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `SPOTIFY_CLIENT_ID` is missing or a
    /// numeric variable does not parse.
    pub fn from_env() -> Result<Self, Error> {
        let client_id = env::var("SPOTIFY_CLIENT_ID")
            .map_err(|_| Error::Config("SPOTIFY_CLIENT_ID must be set".to_string()))?;

        let mut auth = AuthSettings::new(
            client_id,
            var_or("SPOTIFY_REDIRECT_URI", DEFAULT_REDIRECT_URI),
        );
        auth.scope = var_or("SPOTIFY_SCOPE", DEFAULT_SCOPE);
        auth.authorize_url = var_or("SPOTIFY_AUTH_URL", DEFAULT_AUTH_URL);
        auth.token_url = var_or("SPOTIFY_TOKEN_URL", DEFAULT_TOKEN_URL);

        Ok(Self {
            auth,
            api_url: var_or("SPOTIFY_API_URL", DEFAULT_API_URL),
            lyrics_url: var_or("LRCLIB_API_URL", DEFAULT_LRCLIB_URL),
            server_address: var_or("SERVER_ADDRESS", DEFAULT_SERVER_ADDRESS),
            poll_interval: Duration::from_millis(number_or("POLL_INTERVAL_MS", 1000)?),
            playback_cache_ttl: Duration::from_millis(number_or("PLAYBACK_CACHE_TTL_MS", 1000)?),
            lyrics_cache_ttl: Duration::from_secs(number_or("LYRICS_CACHE_TTL_SECS", 3600)?),
            pause_tolerance_ms: number_or("PAUSE_TOLERANCE_MS", 250)?,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn number_or(name: &str, default: u64) -> Result<u64, Error> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| Error::Config(format!("{name}={raw}: {e}"))),
        _ => Ok(default),
    }
}
