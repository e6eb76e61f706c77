use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_code_verifier() -> String {
    random_alphanumeric(128)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Nonce sent as the OAuth `state` parameter.
pub fn generate_state() -> String {
    random_alphanumeric(32)
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Formats milliseconds as `mm:ss.xx`.
pub fn format_timestamp(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let centis = (ms % 1_000) / 10;
    format!("{minutes:02}:{seconds:02}.{centis:02}")
}

/// Normalizes an artist or title so equivalent spellings share a cache key.
///
/// Lowercases, collapses whitespace, and drops featuring credits and
/// remaster/live suffixes, e.g. `"Song (feat. X) - 2011 Remaster"` becomes
/// `"song"`.
pub fn normalize_track_text(text: &str) -> String {
    let mut cleaned = text.to_lowercase();

    for (open, close) in [('(', ')'), ('[', ']')] {
        while let Some(start) = find_feat_group(&cleaned, open) {
            let end = cleaned[start..]
                .find(close)
                .map_or(cleaned.len(), |i| start + i + close.len_utf8());
            cleaned.replace_range(start..end, " ");
        }
    }

    if let Some(idx) = cleaned.find(" - ") {
        let suffix = &cleaned[idx + 3..];
        if ["remaster", "live", "mono", "stereo", "radio edit"]
            .iter()
            .any(|marker| suffix.contains(marker))
        {
            cleaned.truncate(idx);
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn find_feat_group(text: &str, open: char) -> Option<usize> {
    ["feat.", "feat ", "ft.", "featuring"].iter().find_map(|marker| {
        let pattern = format!("{open}{marker}");
        text.find(&pattern)
    })
}

/// Deterministic cache key from an endpoint and its parameters.
///
/// Parameters are sorted by name so call-site order does not matter.
pub fn cache_key(endpoint: &str, params: &[(&str, &str)]) -> String {
    let mut params = params.to_vec();
    params.sort_by(|a, b| a.0.cmp(b.0));

    let mut key = endpoint.to_string();
    for (name, value) in params {
        key.push_str(&format!("|{name}={value}"));
    }
    key
}
