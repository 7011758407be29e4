//! Ingestion pipeline for the runtimes inventory: fetches announced telemetry snapshots, extracts
//! and classifies their payloads, and reconciles the resulting instance graphs into the store.

pub mod announcement;
pub mod classify;
pub mod clock;
pub mod config;
pub mod constants;
pub mod dedupe;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod keyed_lock;
pub mod logging;
pub mod pipeline;
pub mod reconcile;
pub mod store;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use error::{ErrorKind, IngestError, IngestResult};
pub use pipeline::{AnnouncementOutcome, ArchiveOutcome, ArchiveReport, PayloadOutcome, Pipeline};
pub use reconcile::{Reconciled, ReconciliationEngine};
pub use worker::{Channel, IngestStats, StatsSnapshot, WorkerPool};
