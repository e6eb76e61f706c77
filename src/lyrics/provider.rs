use std::{sync::Arc, time::Duration};

use reqwest::{Client, StatusCode, header::USER_AGENT};

use crate::{
    debug,
    error::Error,
    lyrics::lrc::{parse_lrc, parse_plain},
    management::{CacheMode, RateLimitedCache},
    types::{LrclibResponse, LyricsDocument},
    utils,
};

const CLIENT_NAME: &str = concat!("lyricsync/", env!("CARGO_PKG_VERSION"));

/// Outcome of a lyrics lookup that reached the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum LyricsLookup {
    Found(Arc<LyricsDocument>),
    NotFound,
}

/// Cache key shared by every spelling of the same track.
pub fn lyrics_cache_key(artist: &str, title: &str) -> String {
    let artist = utils::normalize_track_text(artist);
    let title = utils::normalize_track_text(title);
    utils::cache_key(
        "lyrics",
        &[("artist", artist.as_str()), ("title", title.as_str())],
    )
}

/// Timed lyrics from an LRCLIB compatible API.
///
/// Results, including "not found", are cached per normalized artist/title
/// for the lifetime of the provider or until [`LyricsProvider::clear_cache`].
/// Transport and parse failures are logged and reported as no lyrics, but
/// are not cached so a later call retries.
pub struct LyricsProvider {
    http: Client,
    base_url: String,
    cache: RateLimitedCache<Option<Arc<LyricsDocument>>>,
    ttl: Duration,
}

impl LyricsProvider {
    pub fn new(base_url: impl Into<String>, ttl: Duration) -> Self {
        Self::with_client(base_url, ttl, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, ttl: Duration, http: Client) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cache: RateLimitedCache::new("lyrics"),
            ttl,
        }
    }

    /// Lyrics for the track, `None` when there are none or they could not be
    /// loaded. Never fails: missing lyrics must not break playback display.
    pub async fn get_synchronized_lyrics(
        &self,
        artist: &str,
        title: &str,
        duration_ms: Option<u64>,
    ) -> Option<Arc<LyricsDocument>> {
        match self.lookup(artist, title, duration_ms).await {
            Ok(LyricsLookup::Found(document)) => Some(document),
            Ok(LyricsLookup::NotFound) => None,
            // logged by the cache
            Err(_) => None,
        }
    }

    /// Same lookup with failures kept apart from "not found".
    pub async fn lookup(
        &self,
        artist: &str,
        title: &str,
        duration_ms: Option<u64>,
    ) -> Result<LyricsLookup, Error> {
        let key = lyrics_cache_key(artist, title);
        let request = LyricsRequest {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            artist: artist.to_string(),
            title: title.to_string(),
            duration_ms,
        };

        let document = self
            .cache
            .get_or_fetch(&key, CacheMode::PreferCache, self.ttl, move || async move {
                match request.fetch().await? {
                    LyricsLookup::Found(document) => Ok(Some(document)),
                    LyricsLookup::NotFound => Ok(None),
                }
            })
            .await?;

        Ok(document.map_or(LyricsLookup::NotFound, LyricsLookup::Found))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

struct LyricsRequest {
    http: Client,
    base_url: String,
    artist: String,
    title: String,
    duration_ms: Option<u64>,
}

impl LyricsRequest {
    async fn fetch(&self) -> Result<LyricsLookup, Error> {
        if let Some(duration_ms) = self.duration_ms {
            let (status, body) = self.get(Some(duration_ms)).await?;
            if status.is_success() {
                return interpret(&body);
            }
            debug!(
                "lyrics lookup with duration answered {}, retrying without",
                status
            );
        }

        let (status, body) = self.get(None).await?;
        if status.is_success() {
            return interpret(&body);
        }
        if status == StatusCode::NOT_FOUND {
            debug!("no lyrics for {} - {}", self.artist, self.title);
            return Ok(LyricsLookup::NotFound);
        }
        Err(Error::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn get(&self, duration_ms: Option<u64>) -> Result<(StatusCode, String), Error> {
        let mut query = vec![
            ("artist_name", self.artist.clone()),
            ("track_name", self.title.clone()),
        ];
        if let Some(duration_ms) = duration_ms {
            // the API matches on whole seconds
            query.push(("duration", ((duration_ms + 500) / 1000).to_string()));
        }

        let url = format!("{}/get", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .get(&url)
            .query(&query)
            .header(USER_AGENT, CLIENT_NAME)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok((status, body))
    }
}

/// Turns an LRCLIB body into a document, preferring synced lyrics.
pub fn interpret(body: &str) -> Result<LyricsLookup, Error> {
    let response: LrclibResponse =
        serde_json::from_str(body).map_err(|e| Error::Parse(format!("lyrics body: {e}")))?;

    if let Some(synced) = response.synced_lyrics.as_deref() {
        let document = parse_lrc(synced);
        if !document.is_empty() {
            return Ok(LyricsLookup::Found(Arc::new(document)));
        }
    }

    if let Some(plain) = response.plain_lyrics.as_deref() {
        let document = parse_plain(plain);
        if !document.is_empty() {
            return Ok(LyricsLookup::Found(Arc::new(document)));
        }
    }

    Ok(LyricsLookup::NotFound)
}
