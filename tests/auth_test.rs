mod common;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use futures_util::future::join_all;
use lyricsync::{
    api::CallbackOutcome,
    error::Error,
    management::{
        KEY_AUTH_TOKEN, MemoryTokenStore, TokenStore, load_json, pkce_session_key,
        pkce_session_states, store_json,
    },
    server::{callback_path, start_api_server},
    spotify::{AuthFlow, AuthState},
    types::{AuthToken, PkceSession},
    utils,
};
use reqwest::Url;
use tokio::sync::Mutex;

use common::{MockServer, auth_flow, token};

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

async fn start_login(auth: &AuthFlow, store: &dyn TokenStore) -> (String, PkceSession) {
    let url = Url::parse(&auth.begin_login().await.unwrap()).unwrap();
    let state = query_param(&url, "state").unwrap();
    let session: PkceSession = load_json(store, &pkce_session_key(&state))
        .await
        .unwrap()
        .expect("session persisted before the url is returned");
    (state, session)
}

#[tokio::test]
async fn test_begin_login_builds_authorize_url() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), None).await;

    let url = Url::parse(&auth.begin_login().await.unwrap()).unwrap();
    assert!(url.as_str().starts_with(&server.url("/authorize")));
    assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(&url, "client_id").as_deref(), Some("client-id"));
    assert_eq!(
        query_param(&url, "redirect_uri").as_deref(),
        Some("http://127.0.0.1:8888/callback")
    );
    assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
    assert_eq!(
        query_param(&url, "scope").as_deref(),
        Some("user-read-playback-state user-modify-playback-state")
    );

    let state = query_param(&url, "state").unwrap();
    assert_eq!(state.len(), 32);

    let session: PkceSession = load_json(&*store, &pkce_session_key(&state))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.verifier.len(), 128);
    assert_eq!(
        query_param(&url, "code_challenge"),
        Some(utils::generate_code_challenge(&session.verifier))
    );
    assert_eq!(auth.state(), AuthState::AwaitingCallback);
}

#[tokio::test]
async fn test_restarted_login_drops_previous_session() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), None).await;

    let (first, _) = start_login(&auth, &*store).await;
    let (second, _) = start_login(&auth, &*store).await;

    assert!(store.get(&pkce_session_key(&first)).await.unwrap().is_none());
    assert!(store.get(&pkce_session_key(&second)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_init_sweeps_abandoned_sessions() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let abandoned = PkceSession {
        verifier: utils::generate_code_verifier(),
        state: "abandoned".to_string(),
        created_at: utils::now_ms() - 3_600_000,
    };
    let recent = PkceSession {
        created_at: utils::now_ms(),
        state: "recent".to_string(),
        ..abandoned.clone()
    };
    store_json(&*store, &pkce_session_key("abandoned"), &abandoned).await.unwrap();
    store_json(&*store, &pkce_session_key("recent"), &recent).await.unwrap();
    store.set(&pkce_session_key("garbled"), "{".to_string()).await.unwrap();

    let dyn_store: Arc<dyn TokenStore> = store.clone();
    let auth = AuthFlow::new(server.auth_settings(), dyn_store);
    auth.init().await.unwrap();

    assert_eq!(pkce_session_states(&*store).await.unwrap(), vec!["recent".to_string()]);
}

#[tokio::test]
async fn test_begin_login_sweeps_timed_out_session() {
    let server = MockServer::start().await;
    let mut settings = server.auth_settings();
    settings.session_ttl = Duration::from_millis(50);
    let (auth, store) = auth_flow(settings, None).await;
    let (first, _) = start_login(&auth, &*store).await;

    // the pending marker moves elsewhere, so only the sweep can remove it
    store.set("pkce_pending_state", "other".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (second, _) = start_login(&auth, &*store).await;

    let states = pkce_session_states(&*store).await.unwrap();
    assert!(!states.contains(&first));
    assert_eq!(states, vec![second]);
}

#[tokio::test]
async fn test_handle_callback_exchanges_code() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), None).await;
    let (state, session) = start_login(&auth, &*store).await;

    let token = auth.handle_callback("the-code", &state).await.unwrap();

    assert_eq!(token.access_token, "access-1");
    assert_eq!(token.refresh_token, "refresh-1");
    assert_eq!(
        token.scope,
        vec!["user-read-playback-state", "user-modify-playback-state"]
    );
    assert!(token.expires_at > utils::now_ms() + 3_500_000);
    assert_eq!(auth.state(), AuthState::Authenticated);
    assert!(auth.is_authenticated());

    let form = server.mock.last_token_form.lock().unwrap().clone();
    assert_eq!(form.get("grant_type").map(String::as_str), Some("authorization_code"));
    assert_eq!(form.get("code").map(String::as_str), Some("the-code"));
    assert_eq!(form.get("client_id").map(String::as_str), Some("client-id"));
    assert_eq!(form.get("code_verifier"), Some(&session.verifier));

    let stored: Option<AuthToken> = load_json(&*store, KEY_AUTH_TOKEN).await.unwrap();
    assert_eq!(stored, Some(token));
    assert!(store.get(&pkce_session_key(&state)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_callback_replay_is_rejected() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), None).await;
    let (state, _) = start_login(&auth, &*store).await;

    auth.handle_callback("the-code", &state).await.unwrap();
    let replay = auth.handle_callback("the-code", &state).await;

    assert!(matches!(replay, Err(Error::InvalidState(_))));
    assert_eq!(server.mock.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_rejected() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), None).await;
    start_login(&auth, &*store).await;

    let result = auth.handle_callback("the-code", "not-the-state").await;
    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert_eq!(server.mock.token_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_expired_session_is_rejected_and_removed() {
    let server = MockServer::start().await;
    let mut settings = server.auth_settings();
    settings.session_ttl = Duration::ZERO;
    let (auth, store) = auth_flow(settings, None).await;
    let (state, _) = start_login(&auth, &*store).await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    let result = auth.handle_callback("the-code", &state).await;

    assert_eq!(
        result,
        Err(Error::InvalidState("login session expired".to_string()))
    );
    assert!(store.get(&pkce_session_key(&state)).await.unwrap().is_none());
    assert_eq!(server.mock.token_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejected_exchange_surfaces_provider_error() {
    let server = MockServer::start().await;
    server.mock.reject_code.store(true, Ordering::SeqCst);
    let (auth, store) = auth_flow(server.auth_settings(), None).await;
    let (state, _) = start_login(&auth, &*store).await;

    let result = auth.handle_callback("bad-code", &state).await;

    assert_eq!(
        result,
        Err(Error::AuthExchange(
            "invalid_grant: Invalid authorization code".to_string()
        ))
    );
    assert_eq!(auth.state(), AuthState::Unauthenticated);
    assert!(auth.current_token().is_none());
}

#[tokio::test]
async fn test_reject_callback_consumes_session() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), None).await;
    let (state, _) = start_login(&auth, &*store).await;

    let error = auth.reject_callback(&state, "access_denied").await;

    assert_eq!(error, Error::AuthExchange("access_denied".to_string()));
    assert_eq!(auth.state(), AuthState::Unauthenticated);
    assert!(store.get(&pkce_session_key(&state)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_fresh_token_needs_no_refresh() {
    let server = MockServer::start().await;
    let (auth, _) = auth_flow(server.auth_settings(), Some(token("access-0", 3_600_000))).await;

    assert_eq!(auth.state(), AuthState::Authenticated);
    assert_eq!(auth.get_valid_token().await.as_deref(), Some("access-0"));
    assert_eq!(server.mock.refresh_requests(), 0);
}

#[tokio::test]
async fn test_token_inside_expiry_skew_is_refreshed() {
    let server = MockServer::start().await;
    // valid for 30 s, less than the 60 s skew
    let (auth, store) = auth_flow(server.auth_settings(), Some(token("access-0", 30_000))).await;

    assert!(auth.is_authenticated());
    assert_eq!(auth.get_valid_token().await.as_deref(), Some("access-1"));
    assert_eq!(server.mock.refresh_requests(), 1);

    // the refresh response carried no refresh token, the old one is kept
    let stored: AuthToken = load_json(&*store, KEY_AUTH_TOKEN).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-1");
    assert_eq!(stored.refresh_token, "refresh-0");

    let form = server.mock.last_token_form.lock().unwrap().clone();
    assert_eq!(form.get("refresh_token").map(String::as_str), Some("refresh-0"));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    server.mock.token_delay_ms.store(50, Ordering::SeqCst);
    let (auth, _) = auth_flow(server.auth_settings(), Some(token("access-0", -1_000))).await;

    let calls = (0..8).map(|_| {
        let auth = Arc::clone(&auth);
        async move { auth.get_valid_token().await }
    });
    let tokens = join_all(calls).await;

    assert!(tokens.iter().all(|t| t.as_deref() == Some("access-1")));
    assert_eq!(server.mock.refresh_requests(), 1);
    assert_eq!(auth.refresh_count(), 1);
    assert_eq!(auth.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_rejected_refresh_clears_session() {
    let server = MockServer::start().await;
    server.mock.reject_refresh.store(true, Ordering::SeqCst);
    let (auth, store) = auth_flow(server.auth_settings(), Some(token("access-0", -1_000))).await;

    assert_eq!(auth.get_valid_token().await, None);
    assert!(auth.current_token().is_none());
    assert_eq!(auth.state(), AuthState::Unauthenticated);
    assert!(store.get(KEY_AUTH_TOKEN).await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_network_failure_keeps_token() {
    let server = MockServer::start().await;
    let mut settings = server.auth_settings();
    // nothing listens on the discard port
    settings.token_url = "http://127.0.0.1:9/token".to_string();
    let (auth, store) = auth_flow(settings, Some(token("access-0", -1_000))).await;

    assert_eq!(auth.get_valid_token().await, None);
    assert_eq!(
        auth.current_token().map(|t| t.access_token).as_deref(),
        Some("access-0")
    );
    assert!(store.get(KEY_AUTH_TOKEN).await.unwrap().is_some());
}

#[tokio::test]
async fn test_valid_token_reports_why_refresh_failed() {
    let server = MockServer::start().await;
    let mut settings = server.auth_settings();
    settings.token_url = "http://127.0.0.1:9/token".to_string();
    let (offline, _) = auth_flow(settings, Some(token("access-0", -1_000))).await;
    assert!(matches!(offline.valid_token().await, Err(Error::Network(_))));
    assert!(matches!(
        offline.refreshed_token("access-0").await,
        Err(Error::Network(_))
    ));

    server.mock.reject_refresh.store(true, Ordering::SeqCst);
    let (rejected, _) = auth_flow(server.auth_settings(), Some(token("access-0", -1_000))).await;
    assert_eq!(rejected.valid_token().await, Err(Error::Unauthorized));

    let (empty, _) = auth_flow(server.auth_settings(), None).await;
    assert_eq!(empty.valid_token().await, Err(Error::Unauthorized));
}

#[tokio::test]
async fn test_force_refresh_skips_request_when_already_replaced() {
    let server = MockServer::start().await;
    let (auth, _) = auth_flow(server.auth_settings(), Some(token("access-0", 3_600_000))).await;

    assert_eq!(auth.force_refresh("access-0").await.as_deref(), Some("access-1"));
    assert_eq!(server.mock.refresh_requests(), 1);

    // a second caller still holding the stale token gets the new one
    assert_eq!(auth.force_refresh("access-0").await.as_deref(), Some("access-1"));
    assert_eq!(server.mock.refresh_requests(), 1);
}

#[tokio::test]
async fn test_no_token_means_no_refresh() {
    let server = MockServer::start().await;
    let (auth, _) = auth_flow(server.auth_settings(), None).await;

    assert_eq!(auth.get_valid_token().await, None);
    assert!(!auth.is_authenticated());
    assert_eq!(server.mock.refresh_requests(), 0);
}

#[tokio::test]
async fn test_logout_clears_store() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), Some(token("access-0", 3_600_000))).await;
    start_login(&auth, &*store).await;

    auth.logout().await.unwrap();

    assert!(store.keys().await.unwrap().is_empty());
    assert!(auth.current_token().is_none());
    assert_eq!(auth.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_teardown_discards_exchange_in_flight() {
    let server = MockServer::start().await;
    server.mock.token_delay_ms.store(200, Ordering::SeqCst);
    let (auth, store) = auth_flow(server.auth_settings(), None).await;
    let (state, _) = start_login(&auth, &*store).await;

    let exchange = auth.handle_callback("the-code", &state);
    let teardown = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        auth.teardown();
    };
    let (result, ()) = tokio::join!(exchange, teardown);

    assert_eq!(result, Err(Error::AuthExchange("login abandoned".to_string())));
    assert!(auth.current_token().is_none());
    assert!(store.get(KEY_AUTH_TOKEN).await.unwrap().is_none());
}

#[test]
fn test_callback_path_keeps_prefix() {
    assert_eq!(
        callback_path("http://127.0.0.1:8888/callback").unwrap(),
        "/callback"
    );
    assert_eq!(
        callback_path("http://localhost:3000/app/auth/callback").unwrap(),
        "/app/auth/callback"
    );
    assert!(matches!(callback_path("not a url"), Err(Error::Config(_))));
}

#[tokio::test]
async fn test_callback_server_completes_login() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), None).await;
    let outcome: CallbackOutcome = Arc::new(Mutex::new(None));
    let (addr, handle) = start_api_server("127.0.0.1:0", Arc::clone(&auth), Arc::clone(&outcome))
        .await
        .unwrap();
    let (state, _) = start_login(&auth, &*store).await;

    let page = reqwest::get(format!("http://{addr}/callback?code=the-code&state={state}"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(page.contains("Authentication successful"));
    let result = outcome.lock().await.take();
    assert!(matches!(result, Some(Ok(ref token)) if token.access_token == "access-1"));
    assert!(auth.is_authenticated());

    let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["auth"], "Authenticated");

    handle.abort();
}

#[tokio::test]
async fn test_callback_server_reports_denied_login() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), None).await;
    let outcome: CallbackOutcome = Arc::new(Mutex::new(None));
    let (addr, handle) = start_api_server("127.0.0.1:0", Arc::clone(&auth), Arc::clone(&outcome))
        .await
        .unwrap();
    let (state, _) = start_login(&auth, &*store).await;

    let page = reqwest::get(format!("http://{addr}/callback?error=access_denied&state={state}"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(page.contains("Login failed"));
    assert_eq!(
        outcome.lock().await.take(),
        Some(Err(Error::AuthExchange("access_denied".to_string())))
    );
    assert_eq!(server.mock.token_requests.load(Ordering::SeqCst), 0);

    handle.abort();
}

#[tokio::test]
async fn test_callback_server_ignores_foreign_state() {
    let server = MockServer::start().await;
    let (auth, store) = auth_flow(server.auth_settings(), None).await;
    let outcome: CallbackOutcome = Arc::new(Mutex::new(None));
    let (addr, handle) = start_api_server("127.0.0.1:0", Arc::clone(&auth), Arc::clone(&outcome))
        .await
        .unwrap();
    let (state, _) = start_login(&auth, &*store).await;

    let page = reqwest::get(format!("http://{addr}/callback?code=old-code&state=stale-state"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Login failed"));
    assert!(outcome.lock().await.is_none());
    assert_eq!(auth.state(), AuthState::AwaitingCallback);

    // the real redirect still completes the pending login
    reqwest::get(format!("http://{addr}/callback?code=the-code&state={state}"))
        .await
        .unwrap();
    assert!(matches!(outcome.lock().await.take(), Some(Ok(_))));

    handle.abort();
}
