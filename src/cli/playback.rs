use tabled::Table;

use crate::{
    cli::session::{fail, open_session},
    config::Settings,
    info, success,
    types::{PlaybackSnapshot, PlaybackTableRow},
    utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Toggle,
    Next,
    Previous,
    Seek(u64),
}

pub fn playback_row(snapshot: &PlaybackSnapshot) -> PlaybackTableRow {
    let state = if snapshot.is_playing { "playing" } else { "paused" };
    let (track, artists) = match &snapshot.track {
        Some(track) => (track.name.clone(), track.artists.join(", ")),
        None => ("-".to_string(), "-".to_string()),
    };

    PlaybackTableRow {
        state: state.to_string(),
        track,
        artists,
        position: format!(
            "{} / {}",
            utils::format_timestamp(snapshot.position_ms),
            utils::format_timestamp(snapshot.duration_ms)
        ),
    }
}

pub async fn status(settings: &Settings) {
    let session = open_session(settings).await;
    session.require_login();

    match session.client.get_playback_state(false, false).await {
        Ok(Some(snapshot)) => println!("{}", Table::new(vec![playback_row(&snapshot)])),
        Ok(None) => info!("Nothing is playing right now"),
        Err(e) => fail("Failed to read playback", e),
    }
}

pub async fn control(settings: &Settings, command: PlayerCommand) {
    let session = open_session(settings).await;
    session.require_login();
    let client = &session.client;

    let result = match command {
        PlayerCommand::Play => client.play().await.map(|_| "Playing".to_string()),
        PlayerCommand::Pause => client.pause().await.map(|_| "Paused".to_string()),
        PlayerCommand::Toggle => client
            .toggle_playback()
            .await
            .map(|playing| if playing { "Playing" } else { "Paused" }.to_string()),
        PlayerCommand::Next => client
            .skip_to_next()
            .await
            .map(|_| "Skipped to next track".to_string()),
        PlayerCommand::Previous => client
            .skip_to_previous()
            .await
            .map(|_| "Skipped to previous track".to_string()),
        PlayerCommand::Seek(position_ms) => client
            .seek(position_ms)
            .await
            .map(|_| format!("Seeked to {}", utils::format_timestamp(position_ms))),
    };

    match result {
        Ok(message) => success!("{}", message),
        Err(e) => fail("Playback command failed", e),
    }
}
