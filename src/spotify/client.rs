use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use reqwest::{
    Client, Method, Response, StatusCode,
    header::{CONTENT_LENGTH, HeaderValue, RETRY_AFTER},
};

use crate::{
    debug,
    error::{DEFAULT_RETRY_AFTER_SECONDS, Error},
    management::{CacheMode, RateLimitedCache},
    spotify::auth::AuthFlow,
    types::{PlaybackSnapshot, PlayerResponse},
    utils,
};

const PLAYER_PATH: &str = "/me/player";

/// Receives every new snapshot, `None` meaning nothing is playing.
pub type StateChangeCallback = Arc<dyn Fn(Option<PlaybackSnapshot>) + Send + Sync>;

/// Reads `Retry-After` as whole seconds, falling back to the default back-off.
pub fn parse_retry_after(header: Option<&HeaderValue>) -> u64 {
    header
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS)
}

/// Authenticated request plumbing, cheap to clone into cache fetches.
#[derive(Clone)]
struct Requester {
    http: Client,
    api_url: String,
    auth: Arc<AuthFlow>,
}

impl Requester {
    /// Sends an authorized request. A `401` is answered with exactly one
    /// forced refresh and one resend. An unreachable token endpoint surfaces
    /// as [`Error::Network`], not as a lost session.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Response, Error> {
        let token = self.auth.valid_token().await?;

        let res = self.dispatch(&method, path, query, &token).await?;
        if res.status() != StatusCode::UNAUTHORIZED {
            return check_status(res).await;
        }

        debug!("401 from {}, refreshing token once", path);
        let token = self.auth.refreshed_token(&token).await?;

        let res = self.dispatch(&method, path, query, &token).await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }
        check_status(res).await
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<Response, Error> {
        let url = format!("{}{}", self.api_url.trim_end_matches('/'), path);
        let mut request = self.http.request(method.clone(), &url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if *method != Method::GET {
            // the Web API answers 411 to body-less PUT/POST without a length
            request = request.header(CONTENT_LENGTH, 0);
        }

        request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))
    }

    async fn fetch_playback(&self) -> Result<Option<PlaybackSnapshot>, Error> {
        let res = self.send(Method::GET, PLAYER_PATH, &[]).await?;
        if res.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let fetched_at_ms = utils::now_ms();
        let body = res
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let player: PlayerResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("playback state: {e}")))?;
        Ok(Some(player.into_snapshot(fetched_at_ms)))
    }
}

async fn check_status(res: Response) -> Result<Response, Error> {
    let status = res.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimit {
            retry_after_seconds: parse_retry_after(res.headers().get(RETRY_AFTER)),
        });
    }
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

/// Spotify Web API wrapper for playback state and playback control.
///
/// Shields callers from expired tokens (one refresh on `401`) and from
/// duplicate concurrent reads (coalesced through the playback cache). Rate
/// limits are not retried here: a `429` fails the call with
/// [`Error::RateLimit`] and the caller decides when to come back.
pub struct SpotifyApiClient {
    requester: Requester,
    playback_cache: RateLimitedCache<Option<PlaybackSnapshot>>,
    playback_ttl: Duration,
    callback: Mutex<Option<StateChangeCallback>>,
}

impl SpotifyApiClient {
    pub fn new(api_url: impl Into<String>, auth: Arc<AuthFlow>, playback_ttl: Duration) -> Self {
        Self::with_client(api_url, auth, playback_ttl, Client::new())
    }

    pub fn with_client(
        api_url: impl Into<String>,
        auth: Arc<AuthFlow>,
        playback_ttl: Duration,
        http: Client,
    ) -> Self {
        Self {
            requester: Requester {
                http,
                api_url: api_url.into(),
                auth,
            },
            playback_cache: RateLimitedCache::new("playback"),
            playback_ttl,
            callback: Mutex::new(None),
        }
    }

    pub fn auth(&self) -> &Arc<AuthFlow> {
        &self.requester.auth
    }

    /// Current playback, `Ok(None)` when nothing is playing (`204`).
    ///
    /// - `force_skip_cache`: always requests, then overwrites the cache
    /// - `use_cache`: answers from a non-expired cache entry when there is one
    /// - neither: a plain request that leaves the cache alone
    pub async fn get_playback_state(
        &self,
        use_cache: bool,
        force_skip_cache: bool,
    ) -> Result<Option<PlaybackSnapshot>, Error> {
        if !use_cache && !force_skip_cache {
            return self.requester.fetch_playback().await;
        }

        let mode = if force_skip_cache {
            CacheMode::Refresh
        } else {
            CacheMode::PreferCache
        };
        let requester = self.requester.clone();
        self.playback_cache
            .get_or_fetch(PLAYER_PATH, mode, self.playback_ttl, move || async move {
                requester.fetch_playback().await
            })
            .await
    }

    /// Stores a snapshot received from a push source so cache-aware reads
    /// see it without a request.
    pub fn prime_playback_cache(&self, snapshot: Option<PlaybackSnapshot>) {
        self.playback_cache
            .insert(PLAYER_PATH, snapshot, self.playback_ttl);
    }

    pub async fn play(&self) -> Result<(), Error> {
        self.command(Method::PUT, "/me/player/play", &[]).await
    }

    pub async fn pause(&self) -> Result<(), Error> {
        self.command(Method::PUT, "/me/player/pause", &[]).await
    }

    pub async fn skip_to_next(&self) -> Result<(), Error> {
        self.command(Method::POST, "/me/player/next", &[]).await
    }

    pub async fn skip_to_previous(&self) -> Result<(), Error> {
        self.command(Method::POST, "/me/player/previous", &[]).await
    }

    pub async fn seek(&self, position_ms: u64) -> Result<(), Error> {
        self.command(
            Method::PUT,
            "/me/player/seek",
            &[("position_ms", position_ms.to_string())],
        )
        .await
    }

    /// Pauses when playing, plays otherwise. Returns whether playback is now
    /// running.
    pub async fn toggle_playback(&self) -> Result<bool, Error> {
        let playing = self
            .get_playback_state(true, false)
            .await?
            .is_some_and(|s| s.is_playing);

        if playing {
            self.pause().await?;
        } else {
            self.play().await?;
        }
        Ok(!playing)
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(), Error> {
        self.requester.send(method, path, query).await?;
        self.playback_cache.invalidate(PLAYER_PATH);
        Ok(())
    }

    /// Registers the single state-change callback, replacing any previous one.
    /// `None` clears it.
    pub fn set_state_change_callback(&self, callback: Option<StateChangeCallback>) {
        *self
            .callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = callback;
    }

    /// Hands a snapshot to the registered callback, if any.
    pub fn emit_state_change(&self, snapshot: Option<PlaybackSnapshot>) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback(snapshot);
        }
    }
}
