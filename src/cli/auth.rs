use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

use crate::{
    api::CallbackOutcome,
    cli::session::{open_session, spinner},
    config::Settings,
    error,
    error::Error,
    server::start_api_server,
    success,
    types::AuthToken,
    warning,
};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn auth(settings: &Settings) {
    let session = open_session(settings).await;
    let outcome: CallbackOutcome = Arc::new(Mutex::new(None));

    let server = match start_api_server(
        &settings.server_address,
        Arc::clone(&session.auth),
        Arc::clone(&outcome),
    )
    .await
    {
        Ok((_, handle)) => handle,
        Err(e) => error!("Failed to start callback server: {}", e),
    };

    let auth_url = match session.auth.begin_login().await {
        Ok(url) => url,
        Err(e) => error!("Failed to start login: {}", e),
    };

    if webbrowser::open(&auth_url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            auth_url
        )
    }

    let result = wait_for_callback(&outcome).await;
    server.abort();

    match result {
        Some(Ok(token)) => success!(
            "Authentication successful! Granted scopes: {}",
            token.scope.join(", ")
        ),
        Some(Err(e)) => error!("Authentication failed: {}", e),
        None => error!("Authentication timed out."),
    }
}

async fn wait_for_callback(outcome: &CallbackOutcome) -> Option<Result<AuthToken, Error>> {
    let pb = spinner("Waiting for the browser login...");
    let start = Instant::now();

    while start.elapsed() < LOGIN_TIMEOUT {
        if let Some(result) = outcome.lock().await.take() {
            pb.finish_and_clear();
            return Some(result);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    pb.finish_and_clear();
    None
}

pub async fn logout(settings: &Settings) {
    let session = open_session(settings).await;
    match session.auth.logout().await {
        Ok(()) => success!("Logged out, stored session removed"),
        Err(e) => error!("Failed to clear stored session: {}", e),
    }
}
