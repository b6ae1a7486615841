//! Kinesis Firehose transformation lambda: drops transactions whose hash was
//! already delivered and returns a disposition for every record.
use std::time::Instant;

use anyhow::Context;
use envconfig::Envconfig;
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use log::{error, info};

use shared::codec;
use shared::config::DedupConfig;
use shared::dedup::DuplicateFilter;
use shared::seen_registry::{DynamoRegistry, SeenRegistry};
use shared::{
    log_service_summary, setup_logging, BatchResult, Disposition, FirehoseRecordResult,
    FirehoseResponseRecord, FirehoseTransformEvent, FirehoseTransformResponse, RawRecord,
};

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    setup_logging();

    let config = DedupConfig::init_from_env().context("invalid configuration")?;
    info!(
        "Filtering duplicates against table {} with a {}h retention",
        config.seen_table_name, config.ttl_hours
    );

    let sdk_config = config.load_sdk_config().await;
    let registry = DynamoRegistry::new(
        aws_sdk_dynamodb::Client::new(&sdk_config),
        config.seen_table_name.clone(),
        config.hash_key_name.clone(),
        config.ttl_attribute_name.clone(),
        config.registry_timeout(),
    );
    let filter = DuplicateFilter::from_config(registry, &config);
    let filter = &filter;

    run(service_fn(
        move |event: LambdaEvent<FirehoseTransformEvent>| async move {
            anyhow::Ok(transform(filter, event.payload).await)
        },
    ))
    .await?;

    Ok(())
}

async fn transform<R: SeenRegistry>(
    filter: &DuplicateFilter<R>,
    event: FirehoseTransformEvent,
) -> FirehoseTransformResponse {
    let start = Instant::now();
    let records = event
        .records
        .into_iter()
        .map(|r| RawRecord::new(r.record_id, r.data))
        .collect::<Vec<_>>();
    let input_count = records.len();
    info!("Processing {} records", input_count);

    let result = filter.process_batch(records).await;
    log_service_summary("stream_processing", input_count, &result, start);

    to_response(result)
}

/// Maps filter outcomes onto the Firehose response. Survivors are re-encoded as a
/// JSON array; dropped and failed records echo their original payload.
fn to_response(result: BatchResult) -> FirehoseTransformResponse {
    let records = result
        .records
        .into_iter()
        .map(|outcome| {
            let (result, data) = match outcome.disposition {
                Disposition::Ok(txs) => match codec::encode(&txs) {
                    Ok(data) => (FirehoseRecordResult::Ok, data),
                    Err(e) => {
                        error!("Failed to encode record {}: {}", outcome.record_id, e);
                        (FirehoseRecordResult::ProcessingFailed, outcome.data)
                    }
                },
                Disposition::Dropped => (FirehoseRecordResult::Dropped, outcome.data),
                Disposition::ProcessingFailed(_) => {
                    (FirehoseRecordResult::ProcessingFailed, outcome.data)
                }
            };
            FirehoseResponseRecord {
                record_id: outcome.record_id,
                result,
                data,
            }
        })
        .collect();
    FirehoseTransformResponse { records }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use super::*;
    use shared::seen_registry::{ManualClock, MemoryRegistry};

    fn filter() -> DuplicateFilter<MemoryRegistry> {
        let clock = ManualClock::new(0);
        let registry = MemoryRegistry::new(clock.clone());
        DuplicateFilter::new(registry, "hash", chrono::Duration::hours(3)).with_clock(Arc::new(clock))
    }

    fn event(records: Value) -> FirehoseTransformEvent {
        serde_json::from_value(json!({
            "invocationId": "inv-1",
            "deliveryStreamArn": "arn:aws:firehose:us-east-1:123456789012:deliverystream/tx",
            "region": "us-east-1",
            "records": records,
        }))
        .unwrap()
    }

    fn b64(v: Value) -> String {
        codec::encode(&v).unwrap()
    }

    #[tokio::test]
    async fn intra_record_duplicate_scenario() {
        let filter = filter();
        let ev = event(json!([
            {"recordId": "r1", "data": b64(json!({"detail": {"txs": [{"hash": "a1"}, {"hash": "a1"}]}}))}
        ]));

        let response = transform(&filter, ev).await;
        assert_eq!(
            response.records,
            vec![FirehoseResponseRecord {
                record_id: "r1".to_string(),
                result: FirehoseRecordResult::Ok,
                data: b64(json!([{"hash": "a1"}])),
            }]
        );
    }

    #[tokio::test]
    async fn sequential_batches_drop_seen_hash() {
        let filter = filter();
        let payload = b64(json!({"detail": {"txs": [{"hash": "b2"}]}}));

        let first = transform(&filter, event(json!([{"recordId": "r1", "data": payload}]))).await;
        assert_eq!(first.records[0].result, FirehoseRecordResult::Ok);

        let second = transform(&filter, event(json!([{"recordId": "r2", "data": payload}]))).await;
        assert_eq!(second.records[0].result, FirehoseRecordResult::Dropped);
        assert_eq!(second.records[0].data, payload);
    }

    #[tokio::test]
    async fn undecodable_record_is_failed_and_echoed() {
        let filter = filter();
        let ev = event(json!([
            {"recordId": "bad", "data": "@@@@"},
            {"recordId": "good", "data": b64(json!({"detail": {"txs": [{"hash": "c3"}]}}))}
        ]));

        let response = transform(&filter, ev).await;
        assert_eq!(response.records[0].record_id, "bad");
        assert_eq!(response.records[0].result, FirehoseRecordResult::ProcessingFailed);
        assert_eq!(response.records[0].data, "@@@@");
        assert_eq!(response.records[1].record_id, "good");
        assert_eq!(response.records[1].result, FirehoseRecordResult::Ok);
    }

    #[test]
    fn response_wire_format() {
        let response = FirehoseTransformResponse {
            records: vec![FirehoseResponseRecord {
                record_id: "r1".to_string(),
                result: FirehoseRecordResult::ProcessingFailed,
                data: "eyJ9".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"records": [{"recordId": "r1", "result": "ProcessingFailed", "data": "eyJ9"}]})
        );
    }

    #[tokio::test]
    async fn empty_event() {
        let response = transform(&filter(), event(json!([]))).await;
        assert!(response.records.is_empty());
    }
}
