//! Suppression of payloads that were already applied.
//!
//! The gate is split in two: [`DuplicateFilter::should_process`] is a pure check made before any
//! store work, and [`DuplicateFilter::mark_applied`] records a payload only once its transaction
//! has committed, so a failed attempt never blocks a redelivery.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use inventory_common::SourceKind;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::Config;

pub trait DuplicateFilter: Send + Sync {
    fn should_process(&self, payload: &str, now: DateTime<Utc>, source: SourceKind) -> bool;

    fn mark_applied(&self, payload: &str, now: DateTime<Utc>, source: SourceKind);
}

/// Lets everything through.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl DuplicateFilter for AcceptAll {
    fn should_process(&self, _payload: &str, _now: DateTime<Utc>, _source: SourceKind) -> bool {
        true
    }

    fn mark_applied(&self, _payload: &str, _now: DateTime<Utc>, _source: SourceKind) {}
}

type Fingerprint = [u8; 32];

/// Converts a configured window, or `None` when it does not fit in a `TimeDelta`.
pub fn window_from_secs(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

/// Remembers the SHA-256 of every applied payload and rejects byte-identical payloads seen again
/// within the window configured for their source. A zero window disables the check for that
/// source.
pub struct RecentPayloads {
    single_blob_window: TimeDelta,
    archive_window: TimeDelta,
    applied: DashMap<(SourceKind, Fingerprint), DateTime<Utc>>,
}

impl RecentPayloads {
    pub fn new(single_blob_window: TimeDelta, archive_window: TimeDelta) -> Self {
        Self {
            single_blob_window,
            archive_window,
            applied: DashMap::new(),
        }
    }

    /// Windows the config loader accepted. A window too large for a `TimeDelta` is clamped to the
    /// largest one.
    pub fn from_config(config: &Config) -> Self {
        let window = |secs| window_from_secs(secs).unwrap_or(TimeDelta::MAX);
        Self::new(
            window(config.dedupe_window_secs),
            window(config.archive_dedupe_window_secs),
        )
    }

    fn window(&self, source: SourceKind) -> TimeDelta {
        match source {
            SourceKind::SingleBlob => self.single_blob_window,
            SourceKind::Archive => self.archive_window,
        }
    }

    fn fingerprint(payload: &str) -> Fingerprint {
        Sha256::digest(payload.as_bytes()).into()
    }

    /// Number of fingerprints currently remembered.
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    fn prune(&self, now: DateTime<Utc>) {
        self.applied
            .retain(|(source, _), applied_at| now - *applied_at < self.window(*source));
    }
}

impl DuplicateFilter for RecentPayloads {
    fn should_process(&self, payload: &str, now: DateTime<Utc>, source: SourceKind) -> bool {
        let window = self.window(source);
        if window <= TimeDelta::zero() {
            return true;
        }

        let key = (source, Self::fingerprint(payload));
        match self.applied.get(&key) {
            Some(applied_at) if now - *applied_at < window => {
                debug!(source = %source, applied_at = %*applied_at, "payload already applied");
                false
            }
            _ => true,
        }
    }

    fn mark_applied(&self, payload: &str, now: DateTime<Utc>, source: SourceKind) {
        if self.window(source) <= TimeDelta::zero() {
            return;
        }

        self.prune(now);
        self.applied
            .insert((source, Self::fingerprint(payload)), now);
    }
}
