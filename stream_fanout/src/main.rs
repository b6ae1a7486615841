//! Kinesis Data Streams consumer: forwards first-seen transactions to the
//! delivery stream one `PutRecord` at a time and reports failed records as
//! partial batch failures so only those get redelivered.
//!
//! A record whose publish fails after its hashes were claimed is still reported,
//! but the retry cannot forward those transactions again: they are logged as lost.
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_kinesis::primitives::Blob;
use envconfig::Envconfig;
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use log::{error, info};

use shared::codec;
use shared::config::DedupConfig;
use shared::dedup::DuplicateFilter;
use shared::seen_registry::{DynamoRegistry, SeenRegistry};
use shared::{
    log_service_summary, setup_logging, Disposition, KinesisBatchResponse, KinesisStreamEvent,
    RawRecord, Transaction,
};

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    setup_logging();

    let config = DedupConfig::init_from_env().context("invalid configuration")?;
    let stream_name = config
        .delivery_stream_name
        .clone()
        .ok_or_else(|| anyhow!("KINESIS_DATASTREAM_NAME must be set in fan-out mode"))?;
    info!(
        "Forwarding first-seen transactions to {} (seen table {}, {}h retention)",
        stream_name, config.seen_table_name, config.ttl_hours
    );

    let sdk_config = config.load_sdk_config().await;
    let registry = DynamoRegistry::new(
        aws_sdk_dynamodb::Client::new(&sdk_config),
        config.seen_table_name.clone(),
        config.hash_key_name.clone(),
        config.ttl_attribute_name.clone(),
        config.registry_timeout(),
    );
    let publisher = KinesisPublisher::new(aws_sdk_kinesis::Client::new(&sdk_config), stream_name);
    let filter = DuplicateFilter::from_config(registry, &config);
    let (filter, publisher) = (&filter, &publisher);

    run(service_fn(
        move |event: LambdaEvent<KinesisStreamEvent>| async move {
            anyhow::Ok(fan_out(filter, publisher, event.payload).await)
        },
    ))
    .await?;

    Ok(())
}

#[async_trait]
pub trait RecordPublisher: Send + Sync {
    async fn publish(&self, partition_key: &str, data: Vec<u8>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct KinesisPublisher {
    client: aws_sdk_kinesis::Client,
    stream_name: String,
}

impl KinesisPublisher {
    pub fn new(client: aws_sdk_kinesis::Client, stream_name: impl Into<String>) -> Self {
        KinesisPublisher {
            client,
            stream_name: stream_name.into(),
        }
    }
}

#[async_trait]
impl RecordPublisher for KinesisPublisher {
    async fn publish(&self, partition_key: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put_record()
            .stream_name(&self.stream_name)
            .partition_key(partition_key)
            .data(Blob::new(data))
            .send()
            .await
            .with_context(|| format!("failed to put record to {}", self.stream_name))?;
        Ok(())
    }
}

/// Publishes `txs` in order. On failure returns the hashes from the failing one
/// onward. Those are already claimed, so redelivering the record drops them
/// instead of forwarding them again.
async fn publish_transactions<P: RecordPublisher>(
    publisher: &P,
    txs: &[Transaction],
) -> Result<(), (Vec<String>, anyhow::Error)> {
    for (i, tx) in txs.iter().enumerate() {
        let res = match codec::to_json_bytes(tx) {
            Ok(data) => publisher.publish(&tx.hash, data).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = res {
            let unpublished = txs[i..].iter().map(|t| t.hash.clone()).collect();
            return Err((unpublished, e));
        }
    }
    Ok(())
}

async fn fan_out<R: SeenRegistry, P: RecordPublisher>(
    filter: &DuplicateFilter<R>,
    publisher: &P,
    event: KinesisStreamEvent,
) -> KinesisBatchResponse {
    let start = Instant::now();
    let records = event
        .records
        .into_iter()
        .map(|r| RawRecord::new(r.kinesis.sequence_number, r.kinesis.data))
        .collect::<Vec<_>>();
    let input_count = records.len();
    info!("Processing {} records", input_count);

    let result = filter.process_batch(records).await;

    let mut failed_ids = vec![];
    for outcome in &result.records {
        match &outcome.disposition {
            Disposition::Ok(txs) => {
                if let Err((unpublished, e)) = publish_transactions(publisher, txs).await {
                    error!("Failed to publish record {}: {:#}", outcome.record_id, e);
                    error!(
                        "Claimed but not forwarded, a retry will drop them as duplicates: {}",
                        unpublished.join(", ")
                    );
                    failed_ids.push(outcome.record_id.clone());
                }
            }
            Disposition::Dropped => {}
            Disposition::ProcessingFailed(_) => failed_ids.push(outcome.record_id.clone()),
        }
    }

    log_service_summary("stream_fanout", input_count, &result, start);
    if !failed_ids.is_empty() {
        error!(
            "Encountered {} errors processing records, returning to Kinesis",
            failed_ids.len()
        );
    }
    KinesisBatchResponse::new(failed_ids)
}
