//! Spotify accounts and Web API integration.
//!
//! - [`auth`] - PKCE authorization code flow and token lifecycle
//! - [`client`] - Playback state and playback control over the Web API
//! - [`monitor`] - Push/poll arbitration feeding the state-change callback

pub mod auth;
pub mod client;
pub mod monitor;

pub use auth::{AuthFlow, AuthState};
pub use client::{SpotifyApiClient, StateChangeCallback};
pub use monitor::{
    ChannelEventSource, MonitorHandle, PlaybackMonitor, PlaybackSource, PlayerEventSource,
};
