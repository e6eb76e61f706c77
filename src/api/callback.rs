use std::sync::Arc;

use axum::{Extension, extract::Query, response::Html};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{error::Error, spotify::AuthFlow, types::AuthToken, warning};

/// Result of the last redirect that belonged to a pending login. The login
/// command polls it to learn when the browser round trip is over. Redirects
/// whose state matches no session never land here.
pub type CallbackOutcome = Arc<Mutex<Option<Result<AuthToken, Error>>>>;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn callback(
    Query(params): Query<CallbackParams>,
    Extension(auth): Extension<Arc<AuthFlow>>,
    Extension(outcome): Extension<CallbackOutcome>,
) -> Html<String> {
    let Some(state) = params.state.as_deref() else {
        return Html("<h4>Missing state parameter.</h4>".to_string());
    };

    let result = match (params.code.as_deref(), params.error.as_deref()) {
        (_, Some(reason)) => Err(auth.reject_callback(state, reason).await),
        (Some(code), None) => auth.handle_callback(code, state).await,
        (None, None) => Err(auth
            .reject_callback(state, "callback carried neither code nor error")
            .await),
    };

    let page = match &result {
        Ok(_) => "<h2>Authentication successful.</h2><p>Close this browser window.</p>".to_string(),
        Err(e) => {
            warning!("Login callback failed: {}", e);
            format!("<h4>Login failed.</h4><p>{}</p>", escape(&e.to_string()))
        }
    };

    if !matches!(result, Err(Error::InvalidState(_))) {
        *outcome.lock().await = Some(result);
    }
    Html(page)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
