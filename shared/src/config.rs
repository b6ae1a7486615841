use std::time::Duration;

use aws_config::retry::RetryConfig;
use aws_config::SdkConfig;
use envconfig::Envconfig;

use crate::codec::EnvelopeShape;

/// Process configuration, read once from the Lambda environment at startup.
#[derive(Envconfig, Clone, Debug)]
pub struct DedupConfig {
    #[envconfig(from = "DYNAMODB_SEEN_TABLE_NAME")]
    pub seen_table_name: String,

    /// Transaction attribute used as the dedup key. Also the table's partition key.
    #[envconfig(from = "HASH_KEY_NAME", default = "hash")]
    pub hash_key_name: String,

    #[envconfig(from = "TTL_ATTRIBUTE_NAME", default = "ttl")]
    pub ttl_attribute_name: String,

    #[envconfig(from = "DDB_ITEM_TTL_HOURS", default = "3")]
    pub ttl_hours: u32,

    #[envconfig(from = "TRANSACTION_ENVELOPE", default = "block")]
    pub envelope: EnvelopeShape,

    /// Only used in fan-out mode.
    #[envconfig(from = "KINESIS_DATASTREAM_NAME")]
    pub delivery_stream_name: Option<String>,

    #[envconfig(from = "REGISTRY_TIMEOUT_MS", default = "2000")]
    pub registry_timeout_ms: u64,

    #[envconfig(from = "AWS_MAX_ATTEMPTS", default = "3")]
    pub max_attempts: u32,
}

impl DedupConfig {
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.ttl_hours))
    }

    pub async fn load_sdk_config(&self) -> SdkConfig {
        aws_config::from_env()
            .retry_config(RetryConfig::standard().with_max_attempts(self.max_attempts))
            .load()
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply() {
        let config =
            DedupConfig::init_from_hashmap(&env(&[("DYNAMODB_SEEN_TABLE_NAME", "seen")])).unwrap();
        assert_eq!(config.seen_table_name, "seen");
        assert_eq!(config.hash_key_name, "hash");
        assert_eq!(config.ttl_attribute_name, "ttl");
        assert_eq!(config.ttl_hours, 3);
        assert_eq!(config.retention(), chrono::Duration::hours(3));
        assert_eq!(config.envelope, EnvelopeShape::Block);
        assert_eq!(config.delivery_stream_name, None);
        assert_eq!(config.registry_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn overrides_are_read() {
        let config = DedupConfig::init_from_hashmap(&env(&[
            ("DYNAMODB_SEEN_TABLE_NAME", "seen"),
            ("HASH_KEY_NAME", "txid"),
            ("DDB_ITEM_TTL_HOURS", "24"),
            ("TRANSACTION_ENVELOPE", "single"),
            ("KINESIS_DATASTREAM_NAME", "delivery"),
        ]))
        .unwrap();
        assert_eq!(config.hash_key_name, "txid");
        assert_eq!(config.ttl_hours, 24);
        assert_eq!(config.envelope, EnvelopeShape::Single);
        assert_eq!(config.delivery_stream_name.as_deref(), Some("delivery"));
    }

    #[test]
    fn table_name_is_required() {
        assert!(DedupConfig::init_from_hashmap(&env(&[])).is_err());
    }

    #[test]
    fn bad_envelope_is_rejected() {
        let res = DedupConfig::init_from_hashmap(&env(&[
            ("DYNAMODB_SEEN_TABLE_NAME", "seen"),
            ("TRANSACTION_ENVELOPE", "xml"),
        ]));
        assert!(res.is_err());
    }
}
