use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{Extension, Router, routing::get};
use reqwest::Url;
use tokio::{net::TcpListener, task::JoinHandle};

use crate::{
    api::{self, CallbackOutcome},
    debug,
    error::Error,
    spotify::AuthFlow,
};

/// Path component of the redirect URI, where the callback route is mounted.
pub fn callback_path(redirect_uri: &str) -> Result<String, Error> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| Error::Config(format!("invalid redirect uri {redirect_uri}: {e}")))?;
    let path = url.path();
    Ok(if path.is_empty() { "/".to_string() } else { path.to_string() })
}

pub fn router(auth: Arc<AuthFlow>, outcome: CallbackOutcome) -> Result<Router, Error> {
    let path = callback_path(&auth.settings().redirect_uri)?;
    Ok(Router::new()
        .route("/health", get(api::health))
        .route(&path, get(api::callback))
        .layer(Extension(auth))
        .layer(Extension(outcome)))
}

/// Binds `address` and serves the callback routes in a background task.
///
/// Returns the bound address, which differs from `address` when port `0` was
/// requested.
pub async fn start_api_server(
    address: &str,
    auth: Arc<AuthFlow>,
    outcome: CallbackOutcome,
) -> Result<(SocketAddr, JoinHandle<()>), Error> {
    let addr = SocketAddr::from_str(address)
        .map_err(|e| Error::Config(format!("invalid server address {address}: {e}")))?;
    let app = router(auth, outcome)?;

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Network(format!("cannot bind {addr}: {e}")))?;
    let bound = listener.local_addr()?;
    debug!("callback server listening on {}", bound);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            debug!("callback server stopped: {}", e);
        }
    });
    Ok((bound, handle))
}
