#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Form, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use lyricsync::{
    config::AuthSettings,
    management::{KEY_AUTH_TOKEN, MemoryTokenStore, TokenStore, store_json},
    spotify::AuthFlow,
    types::AuthToken,
    utils,
};
use serde_json::json;

/// Canned reply for the player and lyrics routes.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<String>,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::new(status, "")
    }

    pub fn retry_after(mut self, value: &str) -> Self {
        self.retry_after = Some(value.to_string());
        self
    }
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut headers = HeaderMap::new();
        if let Some(value) = self.retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from_str(&value).unwrap());
        }
        (status, headers, self.body).into_response()
    }
}

/// Token endpoint, Web API player routes and LRCLIB `/api/get` in one server.
#[derive(Default)]
pub struct Mock {
    pub token_requests: AtomicUsize,
    pub refresh_requests: AtomicUsize,
    pub issued: AtomicUsize,
    pub reject_refresh: AtomicBool,
    pub reject_code: AtomicBool,
    pub token_delay_ms: AtomicU64,
    pub last_token_form: Mutex<HashMap<String, String>>,

    pub player_requests: AtomicUsize,
    pub player_delay_ms: AtomicU64,
    pub player_responses: Mutex<VecDeque<MockResponse>>,
    pub bearer_tokens: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<String>>,

    pub lyrics_responses: Mutex<VecDeque<MockResponse>>,
    pub lyrics_queries: Mutex<Vec<HashMap<String, String>>>,
}

impl Mock {
    pub fn queue_player(&self, response: MockResponse) {
        self.player_responses.lock().unwrap().push_back(response);
    }

    pub fn queue_lyrics(&self, response: MockResponse) {
        self.lyrics_responses.lock().unwrap().push_back(response);
    }

    pub fn player_requests(&self) -> usize {
        self.player_requests.load(Ordering::SeqCst)
    }

    pub fn refresh_requests(&self) -> usize {
        self.refresh_requests.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn lyrics_queries(&self) -> Vec<HashMap<String, String>> {
        self.lyrics_queries.lock().unwrap().clone()
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub mock: Arc<Mock>,
}

impl MockServer {
    pub async fn start() -> Self {
        let mock = Arc::new(Mock::default());
        let app = Router::new()
            .route("/token", post(token_endpoint))
            .route("/v1/me/player", get(player_endpoint))
            .route("/v1/me/player/play", put(command))
            .route("/v1/me/player/pause", put(command))
            .route("/v1/me/player/seek", put(command))
            .route("/v1/me/player/next", post(command))
            .route("/v1/me/player/previous", post(command))
            .route("/api/get", get(lyrics_endpoint))
            .with_state(Arc::clone(&mock));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, mock }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn auth_settings(&self) -> AuthSettings {
        let mut settings = AuthSettings::new("client-id", "http://127.0.0.1:8888/callback");
        settings.authorize_url = self.url("/authorize");
        settings.token_url = self.url("/token");
        settings
    }

    pub fn api_url(&self) -> String {
        self.url("/v1")
    }

    pub fn lyrics_url(&self) -> String {
        self.url("/api")
    }
}

pub fn token(access: &str, expires_in_ms: i64) -> AuthToken {
    AuthToken {
        access_token: access.to_string(),
        refresh_token: "refresh-0".to_string(),
        expires_at: utils::now_ms() + expires_in_ms,
        scope: vec!["user-read-playback-state".to_string()],
    }
}

/// Auth flow over a memory store, already holding `seed` when given.
pub async fn auth_flow(
    settings: AuthSettings,
    seed: Option<AuthToken>,
) -> (Arc<AuthFlow>, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new());
    if let Some(seed) = seed {
        store_json(&*store, KEY_AUTH_TOKEN, &seed).await.unwrap();
    }
    let dyn_store: Arc<dyn TokenStore> = store.clone();
    let auth = Arc::new(AuthFlow::new(settings, dyn_store));
    auth.init().await.unwrap();
    (auth, store)
}

pub fn player_body(track_id: &str, progress_ms: u64, is_playing: bool) -> String {
    json!({
        "is_playing": is_playing,
        "progress_ms": progress_ms,
        "item": {
            "id": track_id,
            "name": "Bohemian Rhapsody",
            "duration_ms": 354_000,
            "artists": [{ "name": "Queen" }],
            "album": { "name": "A Night at the Opera" }
        }
    })
    .to_string()
}

async fn token_endpoint(State(mock): State<Arc<Mock>>, Form(form): Form<HashMap<String, String>>) -> Response {
    mock.token_requests.fetch_add(1, Ordering::SeqCst);
    *mock.last_token_form.lock().unwrap() = form.clone();

    let delay = mock.token_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    match form.get("grant_type").map(String::as_str) {
        Some("refresh_token") => {
            mock.refresh_requests.fetch_add(1, Ordering::SeqCst);
            if mock.reject_refresh.load(Ordering::SeqCst) {
                return invalid_grant("Refresh token revoked");
            }
            let n = mock.issued.fetch_add(1, Ordering::SeqCst) + 1;
            axum::Json(json!({
                "access_token": format!("access-{n}"),
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "user-read-playback-state user-modify-playback-state"
            }))
            .into_response()
        }
        Some("authorization_code") => {
            if mock.reject_code.load(Ordering::SeqCst) {
                return invalid_grant("Invalid authorization code");
            }
            let n = mock.issued.fetch_add(1, Ordering::SeqCst) + 1;
            axum::Json(json!({
                "access_token": format!("access-{n}"),
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "refresh-1",
                "scope": "user-read-playback-state user-modify-playback-state"
            }))
            .into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "unsupported grant").into_response(),
    }
}

fn invalid_grant(description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "invalid_grant",
            "error_description": description
        })),
    )
        .into_response()
}

fn record_bearer(mock: &Mock, headers: &HeaderMap) {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let token = value.trim_start_matches("Bearer ").to_string();
        mock.bearer_tokens.lock().unwrap().push(token);
    }
}

async fn player_endpoint(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    mock.player_requests.fetch_add(1, Ordering::SeqCst);
    record_bearer(&mock, &headers);

    let delay = mock.player_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let response = mock.player_responses.lock().unwrap().pop_front();
    response
        .unwrap_or_else(|| MockResponse::status(204))
        .into_response()
}

async fn command(
    State(mock): State<Arc<Mock>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    record_bearer(&mock, &headers);
    let path = uri.path().trim_start_matches("/v1");
    let entry = match uri.query() {
        Some(query) => format!("{method} {path}?{query}"),
        None => format!("{method} {path}"),
    };
    mock.commands.lock().unwrap().push(entry);
    StatusCode::NO_CONTENT.into_response()
}

async fn lyrics_endpoint(State(mock): State<Arc<Mock>>, Query(query): Query<HashMap<String, String>>) -> Response {
    mock.lyrics_queries.lock().unwrap().push(query);
    let response = mock.lyrics_responses.lock().unwrap().pop_front();
    response
        .unwrap_or_else(|| MockResponse::new(404, r#"{"code":404,"message":"Failed to find specified track"}"#))
        .into_response()
}
