use std::sync::Arc;

use axum::{Extension, response::Json};
use serde_json::{Value, json};

use crate::spotify::AuthFlow;

pub async fn health(Extension(auth): Extension<Arc<AuthFlow>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "auth": format!("{:?}", auth.state()),
    }))
}
