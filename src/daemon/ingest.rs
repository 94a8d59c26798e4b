//! Submission parsing, identity resolution and freshness checks

use super::error::BoundaryError;
use crate::crypto::sha256_hex;
use crate::ethics::EthicalColor;
use crate::shard::EmoShard;
use serde_json::Value;

/// Longest accepted upstream packet id
pub const MAX_PACKET_ID_LEN: usize = 128;

const SHARD_LAYER: &str = "L5_SHARD";

/// A parsed submission: a bare shard, or the parts of a wrapping packet the
/// boundary needs
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub shard: EmoShard,
    pub packet_id: Option<String>,
    pub ethical_metadata: Option<Value>,
    pub upstream_color: Option<EthicalColor>,
}

impl Submission {
    pub fn is_packet(&self) -> bool {
        self.ethical_metadata.is_some() || self.packet_id.is_some()
    }
}

/// Parse raw request bytes as a bare shard or a packet.
///
/// Packets are recognised by their `states` array. The shard comes from the
/// `L5_SHARD` frame, falling back to the packet `payload`.
pub fn parse_submission(body: &[u8]) -> Result<Submission, BoundaryError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| BoundaryError::BadJson(format!("body is not valid JSON: {}", e)))?;
    let Value::Object(object) = value else {
        return Err(BoundaryError::ShardInvalid("body must be a JSON object".into()));
    };

    let (shard_value, packet_id, ethical_metadata) = if object.contains_key("states") {
        let from_frame = object
            .get("states")
            .and_then(Value::as_array)
            .and_then(|frames| {
                frames
                    .iter()
                    .find(|f| f.get("layer").and_then(Value::as_str) == Some(SHARD_LAYER))
            })
            .and_then(|frame| frame.get("payload"))
            .cloned();
        let shard_value = from_frame
            .or_else(|| object.get("payload").cloned())
            .ok_or_else(|| BoundaryError::ShardInvalid("packet carries no shard".into()))?;

        let packet_id = match object.get("packet_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) if !id.is_empty() && id.len() <= MAX_PACKET_ID_LEN => {
                Some(id.clone())
            }
            Some(_) => {
                return Err(BoundaryError::ShardInvalid(format!(
                    "packet_id must be a string of 1..={} characters",
                    MAX_PACKET_ID_LEN
                )))
            }
        };
        let ethical_metadata = object
            .get("ethical_metadata")
            .filter(|v| !v.is_null())
            .cloned();
        (shard_value, packet_id, ethical_metadata)
    } else {
        (Value::Object(object), None, None)
    };

    let upstream_color = ethical_metadata
        .as_ref()
        .and_then(|meta| meta.get("ethical_color"))
        .and_then(|c| serde_json::from_value::<EthicalColor>(c.clone()).ok());

    let shard: EmoShard = serde_json::from_value(shard_value)
        .map_err(|e| BoundaryError::ShardInvalid(format!("shard does not match schema: {}", e)))?;
    shard
        .validate()
        .map_err(|e| BoundaryError::ShardInvalid(e.to_string()))?;

    Ok(Submission {
        shard,
        packet_id,
        ethical_metadata,
        upstream_color,
    })
}

/// Upstream packet id if present, else SHA-256 of the raw bytes
pub fn resolve_identity(packet_id: Option<&str>, raw: &[u8]) -> String {
    match packet_id {
        Some(id) => id.to_string(),
        None => sha256_hex(raw),
    }
}

/// Reject timestamps more than `max_skew_ms` away from `now_ms` in either
/// direction.
pub fn check_skew(timestamp_ms: u64, now_ms: u64, max_skew_ms: u64) -> Result<(), BoundaryError> {
    let skew = timestamp_ms.abs_diff(now_ms);
    if skew > max_skew_ms {
        return Err(BoundaryError::TimestampInvalid(format!(
            "timestamp is {}ms from server time (max {}ms)",
            skew, max_skew_ms
        )));
    }
    Ok(())
}
