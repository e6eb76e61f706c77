use tabled::Table;

use crate::{
    cli::session::{fail, spinner},
    config::Settings,
    info,
    lyrics::{LyricsLookup, LyricsProvider},
    types::{LyricTableRow, LyricsDocument},
    utils, warning,
};

pub fn lyric_rows(document: &LyricsDocument) -> Vec<LyricTableRow> {
    document
        .lines
        .iter()
        .map(|line| LyricTableRow {
            time: if document.synced {
                utils::format_timestamp(line.time_ms)
            } else {
                String::new()
            },
            text: line.text.clone(),
        })
        .collect()
}

pub async fn lyrics(settings: &Settings, artist: &str, title: &str, duration_ms: Option<u64>) {
    let provider = LyricsProvider::new(settings.lyrics_url.clone(), settings.lyrics_cache_ttl);

    let pb = spinner(&format!("Looking up lyrics for {artist} - {title}..."));
    let result = provider.lookup(artist, title, duration_ms).await;
    pb.finish_and_clear();

    match result {
        Ok(LyricsLookup::Found(document)) => {
            if !document.synced {
                info!("Only unsynced lyrics are available");
            } else if document.has_word_timestamps {
                info!("Lyrics carry word timings");
            }
            println!("{}", Table::new(lyric_rows(&document)));
        }
        Ok(LyricsLookup::NotFound) => warning!("No lyrics found for {} - {}", artist, title),
        Err(e) => fail("Lyrics lookup failed", e),
    }
}
