use std::{sync::Arc, time::Duration};

use colored::Colorize;
use tokio::sync::mpsc;

use crate::{
    cli::session::{fail, open_session},
    config::Settings,
    error, info,
    lyrics::LyricsProvider,
    spotify::PlaybackMonitor,
    sync::{DEFAULT_HISTORY, PauseDetector, SyncEngine},
    types::{LyricsDocument, PlaybackSnapshot},
    utils, warning,
};

const TICK: Duration = Duration::from_millis(100);

/// Follows playback until Ctrl-C and prints each lyric line as it starts.
pub async fn watch(settings: &Settings) {
    let session = open_session(settings).await;
    session.require_login();

    let (tx, mut rx) = mpsc::unbounded_channel::<Option<PlaybackSnapshot>>();
    session
        .client
        .set_state_change_callback(Some(Arc::new(move |snapshot| {
            let _ = tx.send(snapshot);
        })));

    let monitor = PlaybackMonitor::new(Arc::clone(&session.client), settings.poll_interval);
    let mut handle = monitor.start(None).await;
    info!("Following playback ({:?}), press Ctrl-C to stop", handle.source);

    let mut view = WatchView::new(PauseDetector::new(
        DEFAULT_HISTORY,
        settings.pause_tolerance_ms,
    ));
    let mut ticker = tokio::time::interval(TICK);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            joined = &mut handle.join => match joined {
                Ok(Ok(())) => break,
                Ok(Err(e)) => fail("Playback monitor stopped", e),
                Err(e) => error!("Playback monitor crashed: {}", e),
            },
            Some(snapshot) = rx.recv() => view.update(snapshot, &session.lyrics).await,
            _ = ticker.tick() => view.render(utils::now_ms()),
        }
    }

    monitor.teardown();
    session.client.set_state_change_callback(None);
    info!("Stopped");
}

struct WatchView {
    engine: SyncEngine,
    snapshot: Option<PlaybackSnapshot>,
    document: Option<Arc<LyricsDocument>>,
    last_line: Option<usize>,
    paused: bool,
}

impl WatchView {
    fn new(detector: PauseDetector) -> Self {
        Self {
            engine: SyncEngine::new(detector),
            snapshot: None,
            document: None,
            last_line: None,
            paused: false,
        }
    }

    async fn update(&mut self, snapshot: Option<PlaybackSnapshot>, lyrics: &LyricsProvider) {
        let previous = self.snapshot.as_ref().and_then(|s| s.track_id());
        let current = snapshot.as_ref().and_then(|s| s.track_id());

        if previous != current {
            self.last_line = None;
            self.document = None;

            match snapshot.as_ref().and_then(|s| s.track.as_ref().map(|t| (s, t))) {
                Some((snapshot, track)) => {
                    info!("Now playing: {} - {}", track.artists.join(", "), track.name);
                    let duration_ms = (snapshot.duration_ms > 0).then_some(snapshot.duration_ms);
                    self.document = lyrics
                        .get_synchronized_lyrics(track.primary_artist(), &track.name, duration_ms)
                        .await;

                    match self.document.as_deref() {
                        None => warning!("No lyrics for this track"),
                        Some(document) if !document.synced => {
                            info!("Only unsynced lyrics are available:");
                            for line in &document.lines {
                                println!("    {}", line.text);
                            }
                        }
                        Some(_) => {}
                    }
                }
                None => info!("Nothing is playing"),
            }
        }

        self.snapshot = snapshot;
    }

    fn render(&mut self, now_ms: i64) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let result = self.engine.tick(self.document.as_deref(), snapshot, now_ms);

        if result.is_paused != self.paused {
            self.paused = result.is_paused;
            if self.paused {
                info!("Paused");
            } else {
                info!("Resumed");
            }
        }

        if result.current_line_index == self.last_line {
            return;
        }
        self.last_line = result.current_line_index;
        if let Some(line) = result.current_line {
            let text = if line.text.is_empty() { "♪" } else { line.text.as_str() };
            println!("{} {}", utils::format_timestamp(line.time_ms).dimmed(), text);
        }
    }
}
