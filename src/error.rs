//! Error taxonomy shared by the auth flow, the Spotify client, the lyrics
//! provider and the cache.
//!
//! Every variant carries owned, cloneable data so a single failed fetch can be
//! handed to every caller that joined it through the cache.

use thiserror::Error;

/// Default back-off used when a `429` response has no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECONDS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The token endpoint rejected a code exchange or a refresh.
    #[error("token exchange rejected: {0}")]
    AuthExchange(String),

    /// The callback `state` matched no pending PKCE session, or the session expired.
    #[error("invalid authorization state: {0}")]
    InvalidState(String),

    /// A `401` persisted after one refresh attempt, or there is no token at all.
    #[error("unauthorized, please run `lyricsync auth` again")]
    Unauthorized,

    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimit { retry_after_seconds: u64 },

    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Errors that end the current session and require a new login.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Error::Unauthorized | Error::AuthExchange(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Parse(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
