use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    debug, error::Error, info, spotify::client::SpotifyApiClient, types::PlaybackSnapshot,
    warning,
};

/// Where playback updates come from for the lifetime of a monitor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackSource {
    /// Pushed by an event source; no polling while connected.
    Sdk,
    /// `GET /me/player` at the poll interval.
    Polling,
}

/// Push-based player connection, e.g. a bridge to a local Connect device.
///
/// `connect` doubles as the capability probe: an error (missing scope,
/// device unavailable) makes the monitor fall back to polling.
#[async_trait]
pub trait PlayerEventSource: Send + Sync {
    async fn connect(&self) -> Result<UnboundedReceiver<Option<PlaybackSnapshot>>, Error>;
}

/// Event source fed through a channel by whatever owns the player.
pub struct ChannelEventSource {
    receiver: Mutex<Option<UnboundedReceiver<Option<PlaybackSnapshot>>>>,
}

impl ChannelEventSource {
    pub fn channel() -> (UnboundedSender<Option<PlaybackSnapshot>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            receiver: Mutex::new(Some(rx)),
        };
        (tx, source)
    }
}

#[async_trait]
impl PlayerEventSource for ChannelEventSource {
    async fn connect(&self) -> Result<UnboundedReceiver<Option<PlaybackSnapshot>>, Error> {
        self.receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| Error::Config("event source already connected".to_string()))
    }
}

/// A started monitor run.
pub struct MonitorHandle {
    pub source: PlaybackSource,
    /// Resolves when the run ends: `Ok` after teardown, `Err` when the
    /// session needs a new login.
    pub join: JoinHandle<Result<(), Error>>,
}

/// Drives the client's state-change callback from the active source.
///
/// Each [`PlaybackMonitor::start`] opens a new epoch. Results that arrive for
/// an older epoch, e.g. a poll response landing after
/// [`PlaybackMonitor::teardown`], are dropped before the callback sees them.
pub struct PlaybackMonitor {
    client: Arc<SpotifyApiClient>,
    poll_interval: Duration,
    epoch: Arc<AtomicU64>,
    cancel: Mutex<CancellationToken>,
    source: Arc<Mutex<Option<PlaybackSource>>>,
}

impl PlaybackMonitor {
    pub fn new(client: Arc<SpotifyApiClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
            epoch: Arc::new(AtomicU64::new(0)),
            cancel: Mutex::new(CancellationToken::new()),
            source: Arc::new(Mutex::new(None)),
        }
    }

    /// Active source, `None` before `start` and after `teardown`.
    pub fn source(&self) -> Option<PlaybackSource> {
        *lock(&self.source)
    }

    /// Picks the source once and spawns the run. A previous run is torn down.
    pub async fn start(&self, sdk: Option<Arc<dyn PlayerEventSource>>) -> MonitorHandle {
        self.teardown();

        let cancel = CancellationToken::new();
        *lock(&self.cancel) = cancel.clone();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let events = match sdk {
            Some(sdk) => match sdk.connect().await {
                Ok(events) => Some(events),
                Err(e) => {
                    warning!("Player events unavailable ({}), polling instead", e);
                    None
                }
            },
            None => None,
        };

        let source = if events.is_some() {
            PlaybackSource::Sdk
        } else {
            PlaybackSource::Polling
        };
        *lock(&self.source) = Some(source);
        debug!("playback monitor epoch {} using {:?}", epoch, source);

        let run = MonitorRun {
            client: Arc::clone(&self.client),
            poll_interval: self.poll_interval,
            epoch_counter: Arc::clone(&self.epoch),
            epoch,
            cancel,
            source: Arc::clone(&self.source),
        };
        let join = tokio::spawn(async move { run.run(events).await });

        MonitorHandle { source, join }
    }

    /// Stops the current run. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        lock(&self.cancel).cancel();
        *lock(&self.source) = None;
    }
}

impl Drop for PlaybackMonitor {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct MonitorRun {
    client: Arc<SpotifyApiClient>,
    poll_interval: Duration,
    epoch_counter: Arc<AtomicU64>,
    epoch: u64,
    cancel: CancellationToken,
    source: Arc<Mutex<Option<PlaybackSource>>>,
}

impl MonitorRun {
    fn is_current(&self) -> bool {
        !self.cancel.is_cancelled() && self.epoch_counter.load(Ordering::SeqCst) == self.epoch
    }

    async fn run(
        self,
        events: Option<UnboundedReceiver<Option<PlaybackSnapshot>>>,
    ) -> Result<(), Error> {
        if let Some(mut events) = events {
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(()),
                    event = events.recv() => match event {
                        Some(snapshot) => {
                            if !self.is_current() {
                                return Ok(());
                            }
                            self.client.prime_playback_cache(snapshot.clone());
                            self.client.emit_state_change(snapshot);
                        }
                        None => break,
                    }
                }
            }

            if !self.is_current() {
                return Ok(());
            }
            info!("Player event stream closed, switching to polling");
            *lock(&self.source) = Some(PlaybackSource::Polling);
        }

        self.poll().await
    }

    async fn poll(&self) -> Result<(), Error> {
        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.poll_interval;

            let result = self.client.get_playback_state(true, true).await;
            if !self.is_current() {
                debug!("discarding poll result from epoch {}", self.epoch);
                return Ok(());
            }

            match result {
                Ok(snapshot) => self.client.emit_state_change(snapshot),
                Err(Error::RateLimit {
                    retry_after_seconds,
                }) => {
                    delay = self
                        .poll_interval
                        .max(Duration::from_secs(retry_after_seconds));
                }
                Err(e) if e.requires_reauth() => return Err(e),
                // already logged by the playback cache
                Err(_) => {}
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
