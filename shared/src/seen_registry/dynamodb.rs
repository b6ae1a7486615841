use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::{operation::put_item::PutItemError, types::AttributeValue, Client};
use log::debug;

use super::{Claim, Clock, SeenRegistry, SystemClock};
use crate::error::RegistryError;

/// Seen registry backed by a DynamoDB table with native TTL enabled on `ttl_attribute`.
///
/// DynamoDB sweeps expired items lazily, so an item past its ttl can linger for a
/// long time. The conditional put treats such an item as absent and overwrites it.
#[derive(Clone)]
pub struct DynamoRegistry {
    client: Client,
    table_name: String,
    key_attribute: String,
    ttl_attribute: String,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl DynamoRegistry {
    pub fn new(
        client: Client,
        table_name: impl Into<String>,
        key_attribute: impl Into<String>,
        ttl_attribute: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        DynamoRegistry {
            client,
            table_name: table_name.into(),
            key_attribute: key_attribute.into(),
            ttl_attribute: ttl_attribute.into(),
            timeout,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl SeenRegistry for DynamoRegistry {
    async fn create_if_absent(&self, key: &str, expires_at: i64) -> Result<Claim, RegistryError> {
        let now = self.clock.now_epoch_seconds();
        let req = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(&self.key_attribute, AttributeValue::S(key.to_string()))
            .item(&self.ttl_attribute, AttributeValue::N(expires_at.to_string()))
            .condition_expression("attribute_not_exists(#pk) OR #ttl <= :now")
            .expression_attribute_names("#pk", &self.key_attribute)
            .expression_attribute_names("#ttl", &self.ttl_attribute)
            .expression_attribute_values(":now", AttributeValue::N(now.to_string()))
            .send();

        // A timed out write may still have landed; the caller must not assume either outcome.
        let res = tokio::time::timeout(self.timeout, req)
            .await
            .map_err(|_| RegistryError::Timeout(self.timeout))?;

        match res {
            Ok(_) => Ok(Claim::Created),
            Err(e) => {
                let se = e.into_service_error();
                match se {
                    PutItemError::ConditionalCheckFailedException(_) => {
                        debug!("Conditional check failed for key: {}", key);
                        Ok(Claim::AlreadyExists)
                    }
                    _ => Err(RegistryError::Unavailable(se.to_string())),
                }
            }
        }
    }
}
