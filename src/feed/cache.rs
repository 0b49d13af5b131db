use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use moka::sync::Cache;
use tracing::{debug, info, warn};

use crate::schedule::ClockTime;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    /// `None` for the aggregate feed.
    pub program_id: Option<String>,
    pub schedule: Vec<ClockTime>,

    /// Part of the key so that feeds built for different schemes or hosts are never mixed up.
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerState {
    Unchecked,
    Seen(Option<SystemTime>),
}

/// Memoized feed documents, dropped wholesale whenever the freshness marker advances.
pub struct FeedCache {
    entries: Cache<FeedKey, Arc<str>>,
    marker: PathBuf,
    last_marker: Mutex<MarkerState>,

    /// Bumped on every wholesale invalidation.
    epoch: AtomicU64,
}

impl FeedCache {
    pub fn new(marker: impl Into<PathBuf>, ttl: Duration, capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            marker: marker.into(),
            last_marker: Mutex::new(MarkerState::Unchecked),
            epoch: AtomicU64::new(0),
        }
    }

    fn read_marker(&self) -> Option<SystemTime> {
        match self.marker.metadata().and_then(|m| m.modified()) {
            Ok(mtime) => Some(mtime),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,

            Err(e) => {
                warn!(
                    "Failed to read the freshness marker `{}`: {e}",
                    self.marker.display()
                );

                None
            }
        }
    }

    /// Clears the cache if the marker has advanced since the last check.
    ///
    /// The first check only records the marker. Returns whether the cache was cleared.
    pub fn invalidate_if_stale(&self) -> bool {
        let current = self.read_marker();
        let mut last = self
            .last_marker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match *last {
            MarkerState::Unchecked => {
                *last = MarkerState::Seen(current);

                false
            }

            // held until the entries are gone: the new marker is never seen with the old entries.
            MarkerState::Seen(previous) if current > previous => {
                *last = MarkerState::Seen(current);
                self.epoch.fetch_add(1, Ordering::SeqCst);
                self.entries.invalidate_all();
                drop(last);
                info!("Feed cache invalidated due to a new recording");

                true
            }

            MarkerState::Seen(_) => false,
        }
    }

    /// Returns the cached document for `key`, building and caching it on a miss.
    ///
    /// A document whose build overlapped an invalidation is returned but not kept.
    pub fn get_or_build<F>(&self, key: FeedKey, build: F) -> Result<Arc<str>>
    where
        F: FnOnce() -> Result<String>,
    {
        self.invalidate_if_stale();
        let epoch = self.epoch.load(Ordering::SeqCst);

        if let Some(document) = self.entries.get(&key) {
            debug!(program = ?key.program_id, base_url = %key.base_url, "Feed cache hit");

            return Ok(document);
        }

        info!(
            "Feed cache miss; generating a feed for {} (program: {})",
            key.base_url,
            key.program_id.as_deref().unwrap_or("all"),
        );
        let document: Arc<str> = build()?.into();

        // a recording may have finished while the files were being listed.
        self.invalidate_if_stale();
        self.entries.insert(key.clone(), document.clone());

        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(program = ?key.program_id, "Discarding a feed built across an invalidation");
            self.entries.invalidate(&key);
        }

        Ok(document)
    }
}
