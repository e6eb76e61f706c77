//! # API Module
//!
//! HTTP handlers for the short-lived local server that receives the OAuth
//! redirect during `lyricsync auth`.
//!
//! ## Endpoints
//!
//! - [`callback`] - Redirect target of the authorize page. Redeems `code` for
//!   a token through [`crate::spotify::AuthFlow::handle_callback`], or drops
//!   the pending session when the provider sent `error` instead. The outcome
//!   is written to a [`CallbackOutcome`] the login command waits on.
//! - [`health`] - Liveness probe reporting the version and the auth state.
//!
//! Both handlers take their dependencies through [`axum::Extension`] layers
//! installed by [`crate::server::router`].
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use axum::{Extension, Router, routing::get};
//! use lyricsync::api::{callback, health};
//!
//! let app = Router::new()
//!     .route("/callback", get(callback))
//!     .route("/health", get(health))
//!     .layer(Extension(auth))
//!     .layer(Extension(outcome));
//! ```

mod callback;
mod health;

pub use callback::{CallbackOutcome, CallbackParams, callback};
pub use health::health;
