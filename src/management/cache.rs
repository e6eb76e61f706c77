use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::{debug, error::Error, warning};

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, Error>>>;

/// How a lookup treats an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Return a non-expired value without fetching.
    PreferCache,
    /// Always fetch, then overwrite the stored value on success.
    Refresh,
}

struct Entry<T> {
    value: Option<(T, Instant)>,
    in_flight: Option<(u64, SharedFetch<T>)>,
}

impl<T> Entry<T> {
    fn empty() -> Self {
        Self {
            value: None,
            in_flight: None,
        }
    }
}

/// TTL cache with request coalescing.
///
/// For every key there is at most one fetch in flight; callers arriving while
/// it runs await the same shared future and receive the same result, errors
/// included. Only successful results are stored. A failed fetch is logged
/// once, by whichever caller settles it first.
pub struct RateLimitedCache<T> {
    name: &'static str,
    entries: Mutex<HashMap<String, Entry<T>>>,
    next_fetch_id: AtomicU64,
    fetches: AtomicUsize,
}

impl<T> RateLimitedCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `name` only appears in log lines.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
            next_fetch_id: AtomicU64::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry<T>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        mode: CacheMode,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, Error>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let (fetch_id, shared) = {
            let mut entries = self.entries();
            let entry = entries.entry(key.to_string()).or_insert_with(Entry::empty);

            if mode == CacheMode::PreferCache {
                if let Some((value, expires_at)) = &entry.value {
                    if Instant::now() < *expires_at {
                        debug!("{} cache hit: {}", self.name, key);
                        return Ok(value.clone());
                    }
                }
            }

            match &entry.in_flight {
                Some((id, shared)) => {
                    debug!("{} joining in-flight fetch: {}", self.name, key);
                    (*id, shared.clone())
                }
                None => {
                    let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                    self.fetches.fetch_add(1, Ordering::Relaxed);
                    let shared = fetch().boxed().shared();
                    entry.in_flight = Some((id, shared.clone()));
                    (id, shared)
                }
            }
        };

        let result = shared.await;
        self.settle(key, fetch_id, &result, ttl);
        result
    }

    fn settle(&self, key: &str, fetch_id: u64, result: &Result<T, Error>, ttl: Duration) {
        let mut entries = self.entries();
        // cleared while the fetch ran
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if !matches!(&entry.in_flight, Some((id, _)) if *id == fetch_id) {
            return;
        }

        entry.in_flight = None;
        match result {
            Ok(value) => entry.value = Some((value.clone(), Instant::now() + ttl)),
            Err(e) => warning!("{} fetch failed for {}: {}", self.name, key, e),
        }
    }

    /// Stores a value obtained elsewhere. A fetch in flight for `key` still
    /// settles afterwards and overwrites it.
    pub fn insert(&self, key: &str, value: T, ttl: Duration) {
        let mut entries = self.entries();
        let entry = entries.entry(key.to_string()).or_insert_with(Entry::empty);
        entry.value = Some((value, Instant::now() + ttl));
    }

    /// Non-expired value for `key`, without fetching.
    pub fn peek(&self, key: &str) -> Option<T> {
        self.entries()
            .get(key)
            .and_then(|entry| entry.value.as_ref())
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone())
    }

    /// Drops the stored value for `key`. An in-flight fetch still settles.
    pub fn invalidate(&self, key: &str) {
        if let Some(entry) = self.entries().get_mut(key) {
            entry.value = None;
        }
    }

    /// Drops everything; results of fetches still running are discarded.
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of keys holding a value, expired or not.
    pub fn len(&self) -> usize {
        self.entries()
            .values()
            .filter(|entry| entry.value.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches started since creation.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}
