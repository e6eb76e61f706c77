use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use reqwest::{Client, Url};

use crate::{
    config::AuthSettings,
    debug,
    error::Error,
    management::{
        KEY_AUTH_TOKEN, TokenStore, load_json, pkce_session_key, pkce_session_states,
        store_json, take_pkce_session,
    },
    types::{AuthToken, PkceSession, TokenErrorResponse, TokenResponse},
    utils, warning,
};

/// Remembers the state nonce of the login in progress so a restarted login
/// can drop the session it replaces.
const KEY_PENDING_STATE: &str = "pkce_pending_state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    AwaitingCallback,
    Exchanging,
    Authenticated,
    Refreshing,
}

/// OAuth 2.0 authorization code flow with PKCE against the Spotify accounts
/// service.
///
/// The flow owns the [`AuthToken`]. Every successful exchange or refresh
/// replaces the token as a whole and writes it to the [`TokenStore`].
/// Refreshes are single-flight: concurrent callers queue on one gate and
/// re-check the token once inside, so a burst of callers during an expired
/// window costs exactly one request to the token endpoint.
///
/// # Lifecycle
///
/// 1. [`AuthFlow::init`] loads a persisted token
/// 2. [`AuthFlow::begin_login`] persists a PKCE session and returns the
///    authorize URL
/// 3. [`AuthFlow::handle_callback`] redeems the code for a token
/// 4. [`AuthFlow::get_valid_token`] hands out access tokens, refreshing
///    as needed
/// 5. [`AuthFlow::teardown`] discards results of requests still running
pub struct AuthFlow {
    settings: AuthSettings,
    http: Client,
    store: Arc<dyn TokenStore>,
    token: Mutex<Option<AuthToken>>,
    state: Mutex<AuthState>,
    refresh_gate: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    refreshes: AtomicUsize,
}

impl AuthFlow {
    pub fn new(settings: AuthSettings, store: Arc<dyn TokenStore>) -> Self {
        Self::with_client(settings, store, Client::new())
    }

    pub fn with_client(settings: AuthSettings, store: Arc<dyn TokenStore>, http: Client) -> Self {
        Self {
            settings,
            http,
            store,
            token: Mutex::new(None),
            state: Mutex::new(AuthState::Unauthenticated),
            refresh_gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Loads the persisted token, if any, and drops abandoned login sessions.
    pub async fn init(&self) -> Result<(), Error> {
        self.sweep_sessions().await?;
        let token: Option<AuthToken> = load_json(&*self.store, KEY_AUTH_TOKEN).await?;
        if let Some(token) = token {
            debug!("loaded token expiring at {}", token.expires_at);
            self.replace_token(Some(token));
            self.set_state(AuthState::Authenticated);
        }
        Ok(())
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn state(&self) -> AuthState {
        *lock(&self.state)
    }

    fn set_state(&self, state: AuthState) {
        *lock(&self.state) = state;
    }

    pub fn current_token(&self) -> Option<AuthToken> {
        lock(&self.token).clone()
    }

    fn replace_token(&self, token: Option<AuthToken>) {
        *lock(&self.token) = token;
    }

    /// Refresh requests sent since creation.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn skew_ms(&self) -> i64 {
        self.settings.expiry_skew.as_millis() as i64
    }

    fn is_fresh(&self, token: &AuthToken) -> bool {
        utils::now_ms() < token.expires_at - self.skew_ms()
    }

    /// Token present and not past its expiry. Never touches the network.
    pub fn is_authenticated(&self) -> bool {
        lock(&self.token)
            .as_ref()
            .is_some_and(|t| !t.is_expired_at(utils::now_ms()))
    }

    /// Starts a login and returns the authorize URL to open in a browser.
    ///
    /// The PKCE session is persisted before the URL is returned because the
    /// caller may hand control to another process (the browser) right after.
    pub async fn begin_login(&self) -> Result<String, Error> {
        let code_verifier = utils::generate_code_verifier();
        let code_challenge = utils::generate_code_challenge(&code_verifier);
        let state = utils::generate_state();

        let auth_url = Url::parse_with_params(
            &self.settings.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("state", state.as_str()),
                ("code_challenge", code_challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("scope", self.settings.scope.as_str()),
            ],
        )
        .map_err(|e| Error::Config(format!("invalid authorize url: {e}")))?;

        if let Some(previous) = self.store.get(KEY_PENDING_STATE).await? {
            self.store.remove(&pkce_session_key(&previous)).await?;
        }
        self.sweep_sessions().await?;

        let session = PkceSession {
            verifier: code_verifier,
            state: state.clone(),
            created_at: utils::now_ms(),
        };
        store_json(&*self.store, &pkce_session_key(&state), &session).await?;
        self.store.set(KEY_PENDING_STATE, state).await?;

        self.set_state(AuthState::AwaitingCallback);
        Ok(auth_url.to_string())
    }

    /// Redeems an authorization code delivered to the redirect URI.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] when `state` matches no pending session, the
    ///   session was already used, or it outlived its TTL
    /// - [`Error::AuthExchange`] when the token endpoint rejects the code
    /// - [`Error::Network`] / [`Error::Parse`] for transport or body failures
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<AuthToken, Error> {
        let session = self.consume_session(state).await?;

        let generation = self.generation.load(Ordering::SeqCst);
        self.set_state(AuthState::Exchanging);

        let response = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("client_id", self.settings.client_id.as_str()),
                ("code_verifier", session.verifier.as_str()),
            ])
            .await;

        if generation != self.generation.load(Ordering::SeqCst) {
            return Err(Error::AuthExchange("login abandoned".to_string()));
        }

        let token = match response {
            Ok(response) => to_auth_token(response, None),
            Err(e) => {
                self.set_state(AuthState::Unauthenticated);
                return Err(e);
            }
        };

        store_json(&*self.store, KEY_AUTH_TOKEN, &token).await?;
        self.replace_token(Some(token.clone()));
        self.set_state(AuthState::Authenticated);
        Ok(token)
    }

    /// Drops the session for a callback that carried `error` instead of a code.
    pub async fn reject_callback(&self, state: &str, reason: &str) -> Error {
        if let Err(e) = self.consume_session(state).await {
            return e;
        }
        self.set_state(AuthState::Unauthenticated);
        Error::AuthExchange(reason.to_string())
    }

    /// Removes PKCE sessions older than the session TTL, and unreadable ones.
    async fn sweep_sessions(&self) -> Result<(), Error> {
        let ttl_ms = self.settings.session_ttl.as_millis() as i64;
        let now = utils::now_ms();

        for state in pkce_session_states(&*self.store).await? {
            let key = pkce_session_key(&state);
            let expired = match load_json::<PkceSession>(&*self.store, &key).await {
                Ok(Some(session)) => now - session.created_at > ttl_ms,
                Ok(None) => false,
                Err(Error::Parse(_)) => true,
                Err(e) => return Err(e),
            };
            if expired {
                debug!("dropping abandoned login session {}", state);
                self.store.remove(&key).await?;
                if self.store.get(KEY_PENDING_STATE).await?.as_deref() == Some(state.as_str()) {
                    self.store.remove(KEY_PENDING_STATE).await?;
                }
            }
        }
        Ok(())
    }

    async fn consume_session(&self, state: &str) -> Result<PkceSession, Error> {
        let session = take_pkce_session(&*self.store, state)
            .await?
            .ok_or_else(|| Error::InvalidState("no pending login for this state".to_string()))?;

        if self.store.get(KEY_PENDING_STATE).await?.as_deref() == Some(state) {
            self.store.remove(KEY_PENDING_STATE).await?;
        }

        let age_ms = utils::now_ms() - session.created_at;
        if age_ms > self.settings.session_ttl.as_millis() as i64 {
            return Err(Error::InvalidState("login session expired".to_string()));
        }
        Ok(session)
    }

    /// Returns an access token that is valid for at least the expiry skew.
    ///
    /// `None` means there is no usable session and the user has to log in
    /// again, or a refresh failed on the network and can be retried later.
    /// [`AuthFlow::valid_token`] tells the two apart.
    pub async fn get_valid_token(&self) -> Option<String> {
        self.valid_token().await.ok()
    }

    /// Like [`AuthFlow::get_valid_token`], with the reason on failure.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] when there is no session or the refresh
    ///   token was rejected
    /// - [`Error::Network`] when the token endpoint could not be reached; the
    ///   stored token is kept
    pub async fn valid_token(&self) -> Result<String, Error> {
        if let Some(token) = self.current_token().filter(|t| self.is_fresh(t)) {
            return Ok(token.access_token);
        }
        self.refresh(None).await
    }

    /// Refreshes although the token looks valid, after the API answered `401`
    /// for `stale`. When another caller already replaced `stale`, its token is
    /// returned without a second request.
    pub async fn force_refresh(&self, stale: &str) -> Option<String> {
        self.refreshed_token(stale).await.ok()
    }

    /// [`AuthFlow::force_refresh`] with the same errors as [`AuthFlow::valid_token`].
    pub async fn refreshed_token(&self, stale: &str) -> Result<String, Error> {
        self.refresh(Some(stale)).await
    }

    async fn refresh(&self, stale: Option<&str>) -> Result<String, Error> {
        let _gate = self.refresh_gate.lock().await;

        let current = self.current_token().ok_or(Error::Unauthorized)?;
        let already_refreshed = match stale {
            Some(stale) => current.access_token != stale,
            None => self.is_fresh(&current),
        };
        if already_refreshed {
            return Ok(current.access_token);
        }

        if current.refresh_token.is_empty() {
            self.drop_session().await;
            return Err(Error::Unauthorized);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        self.set_state(AuthState::Refreshing);
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        debug!("refreshing access token");

        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
                ("client_id", self.settings.client_id.as_str()),
            ])
            .await;

        if generation != self.generation.load(Ordering::SeqCst) {
            return Err(Error::Unauthorized);
        }

        match response {
            Ok(response) => {
                let token = to_auth_token(response, Some(current.refresh_token));
                if let Err(e) = store_json(&*self.store, KEY_AUTH_TOKEN, &token).await {
                    warning!("Failed to persist refreshed token: {}", e);
                }
                let access_token = token.access_token.clone();
                self.replace_token(Some(token));
                self.set_state(AuthState::Authenticated);
                Ok(access_token)
            }
            Err(Error::Network(e)) => {
                warning!("Token refresh failed, will retry: {}", e);
                self.set_state(AuthState::Authenticated);
                Err(Error::Network(e))
            }
            Err(e) => {
                warning!("Token refresh rejected: {}", e);
                self.drop_session().await;
                Err(Error::Unauthorized)
            }
        }
    }

    async fn drop_session(&self) {
        self.replace_token(None);
        self.set_state(AuthState::Unauthenticated);
        if let Err(e) = self.store.remove(KEY_AUTH_TOKEN).await {
            warning!("Failed to remove stored token: {}", e);
        }
    }

    /// Forgets the session and wipes the store.
    pub async fn logout(&self) -> Result<(), Error> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.replace_token(None);
        self.set_state(AuthState::Unauthenticated);
        self.store.clear().await
    }

    /// Detaches in-flight exchanges; their results are discarded on arrival.
    /// The stored token is kept for the next `init`.
    pub fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.replace_token(None);
        self.set_state(AuthState::Unauthenticated);
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, Error> {
        let res = self
            .http
            .post(&self.settings.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| Error::Parse(format!("token response: {e}")));
        }

        let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(TokenErrorResponse {
                error,
                error_description: Some(description),
            }) => format!("{error}: {description}"),
            Ok(TokenErrorResponse { error, .. }) => error,
            Err(_) => format!("{} {}", status.as_u16(), body.trim()),
        };
        Err(Error::AuthExchange(reason))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_auth_token(response: TokenResponse, previous_refresh: Option<String>) -> AuthToken {
    let refresh_token = response
        .refresh_token
        .filter(|t| !t.is_empty())
        .or(previous_refresh)
        .unwrap_or_default();

    AuthToken {
        access_token: response.access_token,
        refresh_token,
        expires_at: utils::now_ms() + response.expires_in * 1000,
        scope: response
            .scope
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    }
}
