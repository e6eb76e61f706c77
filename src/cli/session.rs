use std::{sync::Arc, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    config::Settings,
    error,
    error::Error,
    lyrics::LyricsProvider,
    management::{FileTokenStore, TokenStore},
    spotify::{AuthFlow, SpotifyApiClient},
};

/// Components shared by the commands, wired from one [`Settings`].
pub struct Session {
    pub auth: Arc<AuthFlow>,
    pub client: Arc<SpotifyApiClient>,
    pub lyrics: Arc<LyricsProvider>,
}

/// Builds the components and loads the stored token.
pub async fn open_session(settings: &Settings) -> Session {
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::default_location());
    let auth = Arc::new(AuthFlow::new(settings.auth.clone(), store));
    if let Err(e) = auth.init().await {
        error!("Failed to load stored session: {}", e);
    }

    let client = Arc::new(SpotifyApiClient::new(
        settings.api_url.clone(),
        Arc::clone(&auth),
        settings.playback_cache_ttl,
    ));
    let lyrics = Arc::new(LyricsProvider::new(
        settings.lyrics_url.clone(),
        settings.lyrics_cache_ttl,
    ));

    Session {
        auth,
        client,
        lyrics,
    }
}

impl Session {
    /// Exits unless a token, possibly expired but refreshable, is loaded.
    pub fn require_login(&self) {
        if self.auth.current_token().is_none() {
            error!("Not logged in. Please run lyricsync auth");
        }
    }
}

pub(crate) fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}

/// Terminates with a message matching the failure.
pub(crate) fn fail(context: &str, e: Error) -> ! {
    match e {
        Error::AuthExchange(_) => {
            error!("{}: {}. Please run lyricsync auth", context, e)
        }
        Error::RateLimit {
            retry_after_seconds,
        } => error!(
            "{}: rate limited, try again in {} seconds",
            context, retry_after_seconds
        ),
        e => error!("{}: {}", context, e),
    }
}
