//! Per-event entry points for the two inbound channels.
//!
//! Everything here runs on a blocking worker thread: fetch, extraction, classification and
//! reconciliation happen one after the other for each event, with async store calls driven through
//! the runtime handle. Results are returned typed; counting and alerting belong to the caller.

use std::sync::Arc;

use inventory_common::{Announcement, SourceKind};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::announcement::parse_announcement;
use crate::classify::classify;
use crate::clock::Clock;
use crate::config::Config;
use crate::dedupe::DuplicateFilter;
use crate::error::{ExtractionError, IngestError, IngestResult, ParseError};
use crate::extract::{decompress_blob, ArchiveExtractor};
use crate::fetch::ObjectStore;
use crate::reconcile::{Reconciled, ReconciliationEngine};
use crate::store::InstanceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadOutcome {
    Applied(Reconciled),
    /// Byte-identical to a payload applied within the dedupe window.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementOutcome {
    Processed(PayloadOutcome),
    /// Not addressed to this channel.
    Ignored,
}

#[derive(Debug)]
pub enum ArchiveOutcome {
    Processed(ArchiveReport),
    Ignored,
}

/// What happened to each payload of one archive. Indices are positions in extraction order.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub outcomes: Vec<(usize, PayloadOutcome)>,
    pub failures: Vec<(usize, IngestError)>,
    /// The error that ended extraction early, if any. Payloads before it were still processed.
    pub truncated: Option<ExtractionError>,
}

impl ArchiveReport {
    pub fn payload_count(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }
}

pub struct Pipeline<S> {
    accepted_content_type: String,
    archive_data_prefix: String,
    objects: Arc<dyn ObjectStore>,
    filter: Arc<dyn DuplicateFilter>,
    clock: Arc<dyn Clock>,
    engine: ReconciliationEngine<S>,
    handle: Handle,
}

impl<S: InstanceStore> Pipeline<S> {
    pub fn new(
        config: &Config,
        objects: Arc<dyn ObjectStore>,
        filter: Arc<dyn DuplicateFilter>,
        clock: Arc<dyn Clock>,
        engine: ReconciliationEngine<S>,
        handle: Handle,
    ) -> Self {
        Self {
            accepted_content_type: config.accepted_content_type.clone(),
            archive_data_prefix: config.archive_data_prefix.clone(),
            objects,
            filter,
            clock,
            engine,
            handle,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine<S> {
        &self.engine
    }

    /// Single-blob channel: one gzip-compressed JSON document per announcement.
    pub fn process_announcement(&self, envelope: &str) -> IngestResult<AnnouncementOutcome> {
        let announce = parse_announcement(envelope)?;

        if !announce.has_content_type(&self.accepted_content_type) {
            debug!(content_type = %announce.content_type, "ignoring announcement");
            return Ok(AnnouncementOutcome::Ignored);
        }

        let url = announce
            .url
            .as_deref()
            .ok_or(ParseError::MissingField("url"))?;

        info!(
            url,
            org_id = %announce.org_id,
            request_id = announce.request_id.as_deref(),
            "processing announcement"
        );

        let compressed = self.objects.fetch_bytes(url)?;
        let payload = decompress_blob(&compressed)?;
        let outcome = self.process_payload(&announce, &payload, SourceKind::SingleBlob)?;

        Ok(AnnouncementOutcome::Processed(outcome))
    }

    /// Archive channel: a gzip-compressed tar whose data-directory entries are processed one by
    /// one, each in its own transaction. A failing payload does not affect the others, and a
    /// corrupt archive keeps whatever was processed before the damage.
    pub fn process_archive_announcement(&self, envelope: &str) -> IngestResult<ArchiveOutcome> {
        let announce = parse_announcement(envelope)?;

        let wanted = announce.has_content_type(&self.accepted_content_type) || announce.is_runtimes;
        let url = match announce.url.as_deref() {
            Some(url) if wanted => url,
            _ => {
                debug!(
                    content_type = %announce.content_type,
                    is_runtimes = announce.is_runtimes,
                    "ignoring archive announcement"
                );
                return Ok(ArchiveOutcome::Ignored);
            }
        };

        info!(
            url,
            org_id = %announce.org_id,
            request_id = announce.request_id.as_deref(),
            "processing archive announcement"
        );

        let reader = self.objects.fetch_reader(url)?;
        let mut extractor = ArchiveExtractor::new(reader, self.archive_data_prefix.as_str());
        let mut report = ArchiveReport::default();

        for (index, payload) in extractor.payloads().enumerate() {
            let payload = match payload {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(url, index, error = %err, "archive truncated");
                    report.truncated = Some(err);
                    continue;
                }
            };

            match self.process_payload(&announce, &payload, SourceKind::Archive) {
                Ok(outcome) => report.outcomes.push((index, outcome)),
                Err(err) => {
                    warn!(
                        url,
                        index,
                        error_kind = %err.kind(),
                        error = %err,
                        "archive payload dropped"
                    );
                    report.failures.push((index, err));
                }
            }
        }

        info!(
            url,
            payloads = report.payload_count(),
            failures = report.failures.len(),
            "archive processed"
        );

        Ok(ArchiveOutcome::Processed(report))
    }

    /// Duplicate gate, classification and reconciliation for one payload. The payload is only
    /// remembered by the duplicate filter once its transaction has committed.
    pub fn process_payload(
        &self,
        announce: &Announcement,
        payload: &str,
        source: SourceKind,
    ) -> IngestResult<PayloadOutcome> {
        if !self.filter.should_process(payload, self.clock.now(), source) {
            info!(org_id = %announce.org_id, source = %source, "skipping duplicate payload");
            return Ok(PayloadOutcome::Duplicate);
        }

        let message = classify(announce, payload)?;
        let reconciled = self
            .handle
            .block_on(self.engine.reconcile(announce, &message))?;

        self.filter.mark_applied(payload, self.clock.now(), source);

        Ok(PayloadOutcome::Applied(reconciled))
    }
}
