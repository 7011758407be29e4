use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::ValueEnum;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::error::{ErrorKind, IngestError};
use crate::pipeline::{AnnouncementOutcome, ArchiveOutcome, PayloadOutcome, Pipeline};
use crate::store::InstanceStore;

/// Which inbound flow a stream of envelopes belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Channel {
    /// One compressed JSON document per announcement.
    Announce,
    /// A compressed tar of JSON documents per announcement.
    Archive,
}

/// Harness counters. Announcements and payloads are counted separately since one archive
/// announcement can carry many payloads.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    ignored: AtomicU64,
    failed_announcements: AtomicU64,
    applied: AtomicU64,
    duplicates: AtomicU64,
    failed_payloads: AtomicU64,
    truncated_archives: AtomicU64,
    panicked_workers: AtomicU64,
    errors: [AtomicU64; ErrorKind::ALL.len()],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub ignored: u64,
    pub failed_announcements: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub failed_payloads: u64,
    pub truncated_archives: u64,
    /// Workers that panicked; also counted in `failed_announcements`.
    pub panicked_workers: u64,
    pub errors: BTreeMap<&'static str, u64>,
}

impl IngestStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self, kind: ErrorKind) {
        if let Some(index) = ErrorKind::ALL.iter().position(|k| *k == kind) {
            Self::bump(&self.errors[index]);
        }
    }

    fn record_payload(&self, outcome: &PayloadOutcome) {
        match outcome {
            PayloadOutcome::Applied(_) => Self::bump(&self.applied),
            PayloadOutcome::Duplicate => Self::bump(&self.duplicates),
        }
    }

    fn record_failed_payload(&self, err: &IngestError) {
        Self::bump(&self.failed_payloads);
        self.record_error(err.kind());
    }

    fn record_failed_announcement(&self, err: &IngestError) {
        Self::bump(&self.failed_announcements);
        self.record_error(err.kind());
    }

    fn record_join(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            error!(error = %e, "worker panicked");
            Self::bump(&self.panicked_workers);
            Self::bump(&self.failed_announcements);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            failed_announcements: self.failed_announcements.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            failed_payloads: self.failed_payloads.load(Ordering::Relaxed),
            truncated_archives: self.truncated_archives.load(Ordering::Relaxed),
            panicked_workers: self.panicked_workers.load(Ordering::Relaxed),
            errors: ErrorKind::ALL
                .iter()
                .zip(&self.errors)
                .map(|(kind, count)| (kind.as_str(), count.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// Runs each event start to finish on its own blocking thread, at most `max_workers` at a time.
pub struct WorkerPool<S> {
    pipeline: Arc<Pipeline<S>>,
    permits: Arc<Semaphore>,
    stats: Arc<IngestStats>,
}

impl<S: InstanceStore + 'static> WorkerPool<S> {
    pub fn new(pipeline: Arc<Pipeline<S>>, max_workers: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_workers)),
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn pipeline(&self) -> &Pipeline<S> {
        &self.pipeline
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Feeds every non-blank line of `input` to the pipeline as one envelope and waits for all
    /// of them to finish.
    pub async fn run<R>(&self, channel: Channel, input: R) -> anyhow::Result<StatsSnapshot>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut workers = JoinSet::new();

        while let Some(line) = lines
            .next_line()
            .await
            .context("failed to read envelope")?
        {
            if line.trim().is_empty() {
                continue;
            }

            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .context("worker pool closed")?;
            let pipeline = self.pipeline.clone();
            let stats = self.stats.clone();

            workers.spawn_blocking(move || {
                let _permit = permit;
                handle_event(&pipeline, &stats, channel, &line);
            });

            while let Some(joined) = workers.try_join_next() {
                self.stats.record_join(joined);
            }
        }

        while let Some(joined) = workers.join_next().await {
            self.stats.record_join(joined);
        }

        let snapshot = self.stats.snapshot();
        info!(
            received = snapshot.received,
            applied = snapshot.applied,
            failed = snapshot.failed_announcements + snapshot.failed_payloads,
            "input exhausted"
        );
        Ok(snapshot)
    }
}

fn handle_event<S: InstanceStore>(
    pipeline: &Pipeline<S>,
    stats: &IngestStats,
    channel: Channel,
    envelope: &str,
) {
    IngestStats::bump(&stats.received);

    match channel {
        Channel::Announce => match pipeline.process_announcement(envelope) {
            Ok(AnnouncementOutcome::Processed(outcome)) => stats.record_payload(&outcome),
            Ok(AnnouncementOutcome::Ignored) => IngestStats::bump(&stats.ignored),
            Err(err) => {
                error!(error_kind = %err.kind(), error = %err, "announcement failed");
                stats.record_failed_announcement(&err);
            }
        },
        Channel::Archive => match pipeline.process_archive_announcement(envelope) {
            Ok(ArchiveOutcome::Processed(report)) => {
                for (_, outcome) in &report.outcomes {
                    stats.record_payload(outcome);
                }
                for (index, err) in &report.failures {
                    error!(index, error_kind = %err.kind(), error = %err, "archive payload failed");
                    stats.record_failed_payload(err);
                }
                if let Some(err) = &report.truncated {
                    warn!(error = %err, "archive was only partially extracted");
                    IngestStats::bump(&stats.truncated_archives);
                }
            }
            Ok(ArchiveOutcome::Ignored) => IngestStats::bump(&stats.ignored),
            Err(err) => {
                error!(error_kind = %err.kind(), error = %err, "archive announcement failed");
                stats.record_failed_announcement(&err);
            }
        },
    }
}
