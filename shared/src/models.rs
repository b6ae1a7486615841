use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecordError;

/// One transaction pulled out of an upstream payload. The original JSON object
/// is kept as-is so it can be re-emitted untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub hash: String,
    pub body: Value,
}

impl Serialize for Transaction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

/// A record as delivered by the stream runtime, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub record_id: String,
    pub data: String,
}

impl RawRecord {
    pub fn new(record_id: impl Into<String>, data: impl Into<String>) -> Self {
        RawRecord {
            record_id: record_id.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug)]
pub enum Disposition {
    /// At least one transaction was seen for the first time.
    Ok(Vec<Transaction>),
    /// Nothing left to deliver, all transactions were already claimed.
    Dropped,
    ProcessingFailed(RecordError),
}

impl Disposition {
    pub fn is_failed(&self) -> bool {
        matches!(self, Disposition::ProcessingFailed(_))
    }
}

#[derive(Debug)]
pub struct RecordOutcome {
    pub record_id: String,
    /// Original encoded payload, echoed back for dropped and failed records.
    pub data: String,
    pub disposition: Disposition,
    pub duplicate_count: usize,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub records: Vec<RecordOutcome>,
}

impl BatchResult {
    pub fn kept_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| match &r.disposition {
                Disposition::Ok(txs) => txs.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn duplicate_count(&self) -> usize {
        self.records.iter().map(|r| r.duplicate_count).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.disposition.is_failed())
            .count()
    }
}

// Kinesis Firehose data transformation contract

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirehoseTransformEvent {
    pub invocation_id: Option<String>,
    pub delivery_stream_arn: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub records: Vec<FirehoseEventRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirehoseEventRecord {
    pub record_id: String,
    pub data: String,
    pub approximate_arrival_timestamp: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FirehoseRecordResult {
    Ok,
    Dropped,
    ProcessingFailed,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FirehoseResponseRecord {
    pub record_id: String,
    pub result: FirehoseRecordResult,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct FirehoseTransformResponse {
    pub records: Vec<FirehoseResponseRecord>,
}

// Kinesis Data Streams event source contract

#[derive(Debug, Deserialize)]
pub struct KinesisStreamEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<KinesisEventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct KinesisEventRecord {
    #[serde(rename = "eventID")]
    pub event_id: Option<String>,
    pub kinesis: KinesisPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinesisPayload {
    pub data: String,
    pub sequence_number: String,
    pub partition_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Partial batch response understood by the Lambda event source mapping.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct KinesisBatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl KinesisBatchResponse {
    pub fn new(ids: Vec<String>) -> KinesisBatchResponse {
        KinesisBatchResponse {
            batch_item_failures: ids
                .into_iter()
                .map(|item_identifier| BatchItemFailure { item_identifier })
                .collect(),
        }
    }
}
