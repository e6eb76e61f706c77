//! LRC parsing.
//!
//! Supported input:
//!
//! ```text
//! [ti:Song]                         metadata, ignored
//! [offset:+250]                     shifts every timestamp 250 ms earlier
//! [00:12.00]A plain timed line
//! [0:15.5]Short minute and fraction fields
//! [00:18.00]Word [00:18.40]timed [00:18.90]line
//! [00:21.00]<00:21.00>Enhanced <00:21.60>word tags
//! ```
//!
//! A line carrying two or more timestamp tags is word-timed: the line starts
//! at its first tag and the text after each tag, up to the next one, is a word
//! starting at that tag.

use crate::types::{LyricLine, LyricWord, LyricsDocument};

/// Parses timed LRC text. Lines come out sorted by start time whatever the
/// input order; lines without a leading timestamp are skipped.
pub fn parse_lrc(text: &str) -> LyricsDocument {
    let offset = parse_offset(text);

    let mut lines: Vec<LyricLine> = text
        .lines()
        .filter_map(|raw| parse_line(raw.trim(), offset))
        .collect();
    lines.sort_by_key(|line| line.time_ms);

    let has_word_timestamps = lines
        .iter()
        .any(|line| line.words.as_ref().is_some_and(|w| !w.is_empty()));

    LyricsDocument {
        lines,
        synced: true,
        has_word_timestamps,
    }
}

/// Unsynced lyrics: one untimed line per non-empty input line.
pub fn parse_plain(text: &str) -> LyricsDocument {
    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| LyricLine {
            time_ms: 0,
            text: line.to_string(),
            words: None,
        })
        .collect();

    LyricsDocument {
        lines,
        synced: false,
        has_word_timestamps: false,
    }
}

/// Parses `m:ss`, `mm:ss.x`, `mm:ss.xx`, `mm:ss.xxx` (also `mm:ss:xx`) into
/// milliseconds.
pub fn parse_timestamp(value: &str) -> Option<u64> {
    let (minutes, rest) = value.trim().split_once(':')?;
    if minutes.is_empty() || minutes.len() > 3 || !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let minutes: u64 = minutes.parse().ok()?;

    let (seconds, fraction) = match rest.split_once(['.', ':']) {
        Some((seconds, fraction)) => (seconds, fraction),
        None => (rest, ""),
    };
    if seconds.is_empty() || seconds.len() > 2 || !seconds.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let seconds: u64 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }

    Some(minutes * 60_000 + seconds * 1_000 + parse_fraction(fraction)?)
}

fn parse_fraction(fraction: &str) -> Option<u64> {
    if fraction.is_empty() {
        return Some(0);
    }
    if fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = fraction.parse().ok()?;
    Some(match fraction.len() {
        1 => value * 100,
        2 => value * 10,
        _ => value,
    })
}

/// Offsets beyond one hour are treated as garbage and ignored.
const MAX_OFFSET_MS: u64 = 3_600_000;

/// `[offset:±ms]`, positive values make lyrics appear earlier.
fn parse_offset(text: &str) -> i64 {
    text.lines()
        .filter_map(|line| {
            let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?;
            let (tag, value) = inner.split_once(':')?;
            if !tag.trim().eq_ignore_ascii_case("offset") {
                return None;
            }
            value.trim().trim_start_matches('+').parse::<i64>().ok()
        })
        .filter(|offset| offset.unsigned_abs() <= MAX_OFFSET_MS)
        .last()
        .unwrap_or(0)
}

fn apply_offset(time_ms: u64, offset: i64) -> u64 {
    i64::try_from(time_ms)
        .unwrap_or(i64::MAX)
        .saturating_sub(offset)
        .max(0) as u64
}

/// Next timestamp tag in `text` as `(start, time_ms, end)` byte positions.
fn next_tag(text: &str) -> Option<(usize, u64, usize)> {
    text.char_indices().find_map(|(start, c)| {
        let close = match c {
            '[' => ']',
            '<' => '>',
            _ => return None,
        };
        let inner_start = start + 1;
        let inner_len = text[inner_start..].find(close)?;
        let time_ms = parse_timestamp(&text[inner_start..inner_start + inner_len])?;
        Some((start, time_ms, inner_start + inner_len + 1))
    })
}

fn parse_line(raw: &str, offset: i64) -> Option<LyricLine> {
    let (start, first, end) = next_tag(raw)?;
    if start != 0 || !raw.starts_with('[') {
        return None;
    }

    let mut segments: Vec<(u64, String)> = vec![(first, String::new())];
    let mut rest = &raw[end..];
    while let Some((start, time_ms, end)) = next_tag(rest) {
        if let Some((_, text)) = segments.last_mut() {
            text.push_str(&rest[..start]);
        }
        segments.push((time_ms, String::new()));
        rest = &rest[end..];
    }
    if let Some((_, text)) = segments.last_mut() {
        text.push_str(rest);
    }

    let text = segments
        .iter()
        .map(|(_, segment)| segment.as_str())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let words = (segments.len() > 1)
        .then(|| word_timings(&segments, offset))
        .filter(|words| !words.is_empty());

    Some(LyricLine {
        time_ms: apply_offset(first, offset),
        text,
        words,
    })
}

fn word_timings(segments: &[(u64, String)], offset: i64) -> Vec<LyricWord> {
    let mut words: Vec<LyricWord> = segments
        .iter()
        .filter_map(|(time_ms, segment)| {
            let text = segment.trim();
            (!text.is_empty()).then(|| LyricWord {
                time_ms: apply_offset(*time_ms, offset),
                text: text.to_string(),
                end_time_ms: None,
            })
        })
        .collect();
    words.sort_by_key(|word| word.time_ms);

    let starts: Vec<u64> = words.iter().map(|word| word.time_ms).collect();
    for (word, next_start) in words.iter_mut().zip(starts.iter().skip(1)) {
        word.end_time_ms = Some(*next_start);
    }
    words
}
