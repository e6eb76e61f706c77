//! Mapping a playback position onto timed lyrics.
//!
//! Lookups are pure functions over a sorted [`LyricsDocument`]. The only state
//! is the short position history in [`PauseDetector`], which infers a pause
//! from positions that stop advancing.

use std::collections::VecDeque;

use crate::types::{LyricLine, LyricsDocument, PlaybackSnapshot, SyncResult};

pub const DEFAULT_HISTORY: usize = 5;
pub const DEFAULT_PAUSE_TOLERANCE_MS: u64 = 250;

/// Index of the last line starting at or before `position_ms`.
///
/// `None` before the first line and for empty or unsynced documents.
pub fn find_line_index(document: &LyricsDocument, position_ms: u64) -> Option<usize> {
    if !document.synced {
        return None;
    }
    document
        .lines
        .partition_point(|line| line.time_ms <= position_ms)
        .checked_sub(1)
}

/// Index of the last word of `line` starting at or before `position_ms`.
pub fn find_word_index(line: &LyricLine, position_ms: u64) -> Option<usize> {
    line.words
        .as_ref()?
        .partition_point(|word| word.time_ms <= position_ms)
        .checked_sub(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PositionSample {
    position_ms: u64,
    observed_at_ms: i64,
}

/// Infers pause state from consecutive position reports.
///
/// This is a heuristic. Between two reports the position should advance by
/// about the wall-clock time elapsed; when it advances by less than that,
/// minus `tolerance_ms` for polling jitter, playback is taken as paused. A
/// backwards jump is read as a seek, not a pause.
#[derive(Debug, Clone)]
pub struct PauseDetector {
    samples: VecDeque<PositionSample>,
    capacity: usize,
    tolerance_ms: u64,
}

impl Default for PauseDetector {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY, DEFAULT_PAUSE_TOLERANCE_MS)
    }
}

impl PauseDetector {
    pub fn new(capacity: usize, tolerance_ms: u64) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            tolerance_ms,
        }
    }

    pub fn tolerance_ms(&self) -> u64 {
        self.tolerance_ms
    }

    pub fn observe(&mut self, position_ms: u64, observed_at_ms: i64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(PositionSample {
            position_ms,
            observed_at_ms,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// `is_playing` is the source's own flag when it has one; `Some(false)`
    /// wins over the position history.
    pub fn is_paused(&self, is_playing: Option<bool>) -> bool {
        if is_playing == Some(false) {
            return true;
        }

        let mut recent = self.samples.iter().rev();
        let (Some(last), Some(previous)) = (recent.next(), recent.next()) else {
            return false;
        };

        let wall_delta = last.observed_at_ms - previous.observed_at_ms;
        if wall_delta <= self.tolerance_ms as i64 {
            return false;
        }
        if last.position_ms < previous.position_ms {
            return false;
        }

        let advanced = (last.position_ms - previous.position_ms) as i64;
        advanced < wall_delta - self.tolerance_ms as i64
    }
}

/// Stateless lookups plus the pause history of the track being followed.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    detector: PauseDetector,
    track_id: Option<String>,
    last_fetched_at_ms: Option<i64>,
}

impl SyncEngine {
    pub fn new(detector: PauseDetector) -> Self {
        Self {
            detector,
            track_id: None,
            last_fetched_at_ms: None,
        }
    }

    pub fn detector(&self) -> &PauseDetector {
        &self.detector
    }

    /// Current line/word for `position_ms`. A missing document gives the
    /// neutral result.
    pub fn compute(
        document: Option<&LyricsDocument>,
        position_ms: u64,
        is_paused: bool,
    ) -> SyncResult {
        Self::compute_with_duration(document, position_ms, is_paused, None)
    }

    pub fn compute_with_duration(
        document: Option<&LyricsDocument>,
        position_ms: u64,
        is_paused: bool,
        duration_ms: Option<u64>,
    ) -> SyncResult {
        let Some(document) = document else {
            return SyncResult::default();
        };

        let Some(index) = find_line_index(document, position_ms) else {
            return SyncResult {
                is_paused,
                ..SyncResult::default()
            };
        };

        let line = &document.lines[index];
        let line_end = document
            .lines
            .get(index + 1)
            .map(|next| next.time_ms)
            .or_else(|| last_word_end(line))
            .or(duration_ms);

        SyncResult {
            current_line_index: Some(index),
            current_line: Some(line.clone()),
            current_word_index: find_word_index(line, position_ms),
            is_paused,
            line_progress: line_end.map(|end| progress(line.time_ms, end, position_ms)),
        }
    }

    /// Feeds `snapshot` into the pause history and computes the result for
    /// `now_ms`, extrapolating the position while playback runs.
    pub fn tick(
        &mut self,
        document: Option<&LyricsDocument>,
        snapshot: &PlaybackSnapshot,
        now_ms: i64,
    ) -> SyncResult {
        let track_id = snapshot.track_id().map(str::to_string);
        if track_id != self.track_id {
            self.detector.reset();
            self.track_id = track_id;
            self.last_fetched_at_ms = None;
        }

        if self.last_fetched_at_ms != Some(snapshot.fetched_at_ms) {
            self.detector
                .observe(snapshot.position_ms, snapshot.fetched_at_ms);
            self.last_fetched_at_ms = Some(snapshot.fetched_at_ms);
        }

        let is_paused = self.detector.is_paused(Some(snapshot.is_playing));
        let position_ms = if is_paused {
            snapshot.position_ms
        } else {
            snapshot.position_at(now_ms)
        };

        let duration_ms = (snapshot.duration_ms > 0).then_some(snapshot.duration_ms);
        Self::compute_with_duration(document, position_ms, is_paused, duration_ms)
    }
}

fn last_word_end(line: &LyricLine) -> Option<u64> {
    line.words.as_ref()?.last()?.end_time_ms
}

fn progress(start_ms: u64, end_ms: u64, position_ms: u64) -> f64 {
    if end_ms <= start_ms {
        return 1.0;
    }
    let elapsed = position_ms.saturating_sub(start_ms) as f64;
    (elapsed / (end_ms - start_ms) as f64).clamp(0.0, 1.0)
}
