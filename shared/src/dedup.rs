//! Duplicate filtering for at-least-once transaction streams.
//!
//! Every transaction hash is claimed in the seen registry with a single
//! create-if-absent write. Whoever lands the write first keeps the transaction;
//! every later attempt, from this batch or any other invocation, drops it.
use std::sync::Arc;

use log::{error, info};

use crate::codec::{self, EnvelopeShape};
use crate::config::DedupConfig;
use crate::error::{RecordError, RegistryError};
use crate::seen_registry::{Claim, Clock, SeenRegistry, SystemClock};
use crate::{BatchResult, Disposition, RawRecord, RecordOutcome, Transaction};

pub struct DuplicateFilter<R> {
    registry: R,
    clock: Arc<dyn Clock>,
    hash_field: String,
    retention: chrono::Duration,
    shape: EnvelopeShape,
}

impl<R: SeenRegistry> DuplicateFilter<R> {
    pub fn new(registry: R, hash_field: impl Into<String>, retention: chrono::Duration) -> Self {
        DuplicateFilter {
            registry,
            clock: Arc::new(SystemClock),
            hash_field: hash_field.into(),
            retention,
            shape: EnvelopeShape::default(),
        }
    }

    pub fn from_config(registry: R, config: &DedupConfig) -> Self {
        Self::new(registry, config.hash_key_name.clone(), config.retention())
            .with_shape(config.envelope)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_shape(mut self, shape: EnvelopeShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Claims `hash` in the registry with a fresh expiry of now + retention.
    pub async fn claim(&self, hash: &str) -> Result<Claim, RegistryError> {
        let expires_at = self.clock.now_epoch_seconds() + self.retention.num_seconds();
        self.registry.create_if_absent(hash, expires_at).await
    }

    /// Processes records one after another. A failing record never affects its siblings.
    pub async fn process_batch(&self, records: Vec<RawRecord>) -> BatchResult {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.process_record(record).await);
        }
        BatchResult { records: outcomes }
    }

    pub async fn process_record(&self, record: RawRecord) -> RecordOutcome {
        let RawRecord { record_id, data } = record;
        let (disposition, duplicate_count) = match self.filter_payload(&data).await {
            Ok((kept, dups)) if kept.is_empty() => (Disposition::Dropped, dups),
            Ok((kept, dups)) => (Disposition::Ok(kept), dups),
            Err(e) => {
                error!("Failed to process record {}: {}", record_id, e);
                (Disposition::ProcessingFailed(e), 0)
            }
        };
        RecordOutcome {
            record_id,
            data,
            disposition,
            duplicate_count,
        }
    }

    /// Returns the first-seen transactions of a payload and how many were dropped.
    async fn filter_payload(&self, data: &str) -> Result<(Vec<Transaction>, usize), RecordError> {
        let value = codec::decode(data)?;
        // validate every hash up front so a malformed record claims nothing
        let txs = codec::extract_transactions(value, self.shape, &self.hash_field)?;
        let total = txs.len();
        info!("Processing block of {} transactions.", total);

        let mut kept = Vec::with_capacity(total);
        for tx in txs {
            // stop at the first registry failure, later hashes stay unclaimed for the retry
            match self.claim(&tx.hash).await? {
                Claim::Created => kept.push(tx),
                Claim::AlreadyExists => {
                    info!("Duplicate transaction hash: {}, skipping...", tx.hash)
                }
            }
        }

        info!("Kept {} of {} transactions.", kept.len(), total);
        let dropped = total - kept.len();
        Ok((kept, dropped))
    }
}
