//! Wire codec for stream records: base64 around JSON, plus the envelope shapes
//! the upstream sources deliver transactions in.
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::{DecodeError, RecordError};
use crate::Transaction;

pub fn decode(raw: impl AsRef<[u8]>) -> Result<Value, DecodeError> {
    let bytes = base64::decode(raw)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(base64::encode(to_json_bytes(value)?))
}

/// JSON without the base64 layer, for SDK calls that take raw bytes.
pub fn to_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// How transactions are laid out inside a decoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeShape {
    /// Block event: `{"detail": {"txs": [...]}}`
    #[default]
    Block,
    Single,
    List,
}

impl FromStr for EnvelopeShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(EnvelopeShape::Block),
            "single" => Ok(EnvelopeShape::Single),
            "list" => Ok(EnvelopeShape::List),
            other => Err(format!("unknown envelope shape: {}", other)),
        }
    }
}

/// Pulls the transactions out of a decoded payload. Fails the whole record if the
/// shape does not match or any transaction lacks a usable hash.
pub fn extract_transactions(
    value: Value,
    shape: EnvelopeShape,
    hash_field: &str,
) -> Result<Vec<Transaction>, RecordError> {
    let candidates = match (shape, value) {
        (EnvelopeShape::Single, v @ Value::Object(_)) => vec![v],
        (EnvelopeShape::List, Value::Array(txs)) => txs,
        (EnvelopeShape::Block, mut v) => match v.pointer_mut("/detail/txs").map(Value::take) {
            Some(Value::Array(txs)) => txs,
            _ => {
                return Err(RecordError::MalformedTransaction(
                    "payload has no detail.txs array".to_string(),
                ))
            }
        },
        (shape, _) => {
            return Err(RecordError::MalformedTransaction(format!(
                "payload does not match {:?} envelope",
                shape
            )))
        }
    };

    candidates
        .into_iter()
        .enumerate()
        .map(|(i, body)| {
            let hash = match body.get(hash_field) {
                Some(Value::String(h)) if !h.is_empty() => h.clone(),
                _ => {
                    return Err(RecordError::MalformedTransaction(format!(
                        "transaction {} has no '{}' field",
                        i, hash_field
                    )))
                }
            };
            Ok(Transaction { hash, body })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_reads_base64_json() {
        let raw = base64::encode(r#"{"hash":"a1","fee":3}"#);
        assert_eq!(decode(raw).unwrap(), json!({"hash": "a1", "fee": 3}));
    }

    #[test]
    fn decode_rejects_bad_base64() {
        assert!(matches!(decode("!!not base64!!"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn decode_rejects_bad_json() {
        let raw = base64::encode("{not json");
        assert!(matches!(decode(raw), Err(DecodeError::Json(_))));
    }

    #[test]
    fn encode_is_base64_json() {
        let encoded = encode(&json!([{"hash": "a1"}])).unwrap();
        assert_eq!(base64::decode(encoded).unwrap(), br#"[{"hash":"a1"}]"#.to_vec());
    }

    #[test]
    fn block_envelope() {
        let v = json!({"detail": {"txs": [{"hash": "a1", "size": 10}, {"hash": "b2"}]}});
        let txs = extract_transactions(v, EnvelopeShape::Block, "hash").unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].hash, "a1");
        assert_eq!(txs[0].body, json!({"hash": "a1", "size": 10}));
        assert_eq!(txs[1].hash, "b2");
    }

    #[test]
    fn block_envelope_without_txs_is_malformed() {
        let v = json!({"detail": {}});
        let err = extract_transactions(v, EnvelopeShape::Block, "hash").unwrap_err();
        assert!(matches!(err, RecordError::MalformedTransaction(_)));
    }

    #[test]
    fn single_and_list_envelopes() {
        let single = extract_transactions(json!({"id": "x"}), EnvelopeShape::Single, "id").unwrap();
        assert_eq!(single[0].hash, "x");

        let list =
            extract_transactions(json!([{"id": "x"}, {"id": "y"}]), EnvelopeShape::List, "id")
                .unwrap();
        assert_eq!(list.iter().map(|t| t.hash.as_str()).collect::<Vec<_>>(), vec!["x", "y"]);

        assert!(extract_transactions(json!([1]), EnvelopeShape::Single, "id").is_err());
    }

    #[test]
    fn missing_or_empty_hash_is_malformed() {
        for tx in [json!({"fee": 1}), json!({"hash": ""}), json!({"hash": 7})] {
            let err = extract_transactions(json!([tx]), EnvelopeShape::List, "hash").unwrap_err();
            assert!(matches!(err, RecordError::MalformedTransaction(_)));
        }
    }

    #[test]
    fn envelope_shape_from_str() {
        assert_eq!("Block".parse::<EnvelopeShape>().unwrap(), EnvelopeShape::Block);
        assert_eq!("list".parse::<EnvelopeShape>().unwrap(), EnvelopeShape::List);
        assert!("csv".parse::<EnvelopeShape>().is_err());
    }
}
