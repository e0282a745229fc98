//! Staleness checking for the repository cache.
//!
//! Freshness is tracked for the cache as a whole through a single marker file
//! holding the time of the last completed refresh pass.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};

use super::CachePaths;
use super::swap::atomic_write;

/// How long a completed pass keeps the cache fresh.
pub fn default_ttl() -> Duration {
    Duration::days(3)
}

/// Freshness of the cache relative to a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    NeverUpdated,
    StaleSince(DateTime<Utc>),
}

/// Reads and writes the last-update marker.
#[derive(Debug, Clone)]
pub struct StalenessTracker {
    marker: PathBuf,
    ttl: Duration,
}

impl StalenessTracker {
    pub fn new(paths: &CachePaths) -> Self {
        Self {
            marker: paths.marker_path(),
            ttl: default_ttl(),
        }
    }

    /// Override the freshness window.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker
    }

    /// Time of the last completed pass, if the marker exists and parses.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        let text = match std::fs::read_to_string(&self.marker) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("failed to read {}: {}", self.marker.display(), e);
                return None;
            }
        };

        let parsed = parse_marker(text.trim());
        if parsed.is_none() {
            log::warn!(
                "ignoring unparseable update marker {}: {:?}",
                self.marker.display(),
                text.trim()
            );
        }
        parsed
    }

    /// Classify the cache at `now`.
    ///
    /// A missing or unreadable marker counts as never updated.
    pub fn status(&self, now: DateTime<Utc>) -> Staleness {
        match self.last_update() {
            None => Staleness::NeverUpdated,
            Some(stored) if now - stored > self.ttl => Staleness::StaleSince(stored),
            Some(_) => Staleness::Fresh,
        }
    }

    /// Record a completed pass at `now`, replacing any previous marker.
    pub fn record_success(&self, now: DateTime<Utc>) -> io::Result<()> {
        let line = format!("{}\n", now.to_rfc3339());
        atomic_write(&self.marker, line.as_bytes())
    }
}

/// Accepts RFC 3339, or a naive ISO-8601 timestamp taken as local time.
fn parse_marker(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.with_timezone(&Utc));
    }

    text.parse::<NaiveDateTime>()
        .ok()?
        .and_local_timezone(Local)
        .earliest()
        .map(|stamp| stamp.with_timezone(&Utc))
}
