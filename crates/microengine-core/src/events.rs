//! Gateway event decoding.
//!
//! Frames on `/events/home` look like `{"event": "<kind>", "data": {...}}`.
//! Only bounty and block events matter here. Other event kinds decode to
//! [`Event::Unknown`] and broken frames to [`Event::Malformed`], so the
//! stream keeps going either way.

use microengine_gateway::{deserialize_block_height, PendingBounty};
use serde::Deserialize;
use uuid::Uuid;

/// A newly posted bounty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BountyEvent {
    pub guid: Uuid,
    pub artifact_uri: String,
    pub expiration_block: u64,
}

/// A new block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEvent {
    pub block_number: u64,
}

/// Decoded gateway event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Bounty(BountyEvent),
    Block(BlockEvent),
    /// An event kind this worker does not act on.
    Unknown { reason: String },
    /// Not JSON, or a bounty/block frame missing required fields.
    Malformed { reason: String },
    /// The feed was re-established; events may have been missed.
    Reconnected,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
enum WireEvent {
    Bounty(WireBounty),
    Block(WireBlock),
}

#[derive(Debug, Deserialize)]
struct WireBounty {
    guid: Uuid,
    uri: String,
    #[serde(deserialize_with = "deserialize_block_height")]
    expiration: u64,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct EventKind {
    event: Option<String>,
}

impl Event {
    /// Decode one text frame. Never fails.
    pub fn decode(frame: &str) -> Self {
        match serde_json::from_str::<WireEvent>(frame) {
            Ok(WireEvent::Bounty(b)) => Event::Bounty(BountyEvent {
                guid: b.guid,
                artifact_uri: b.uri,
                expiration_block: b.expiration,
            }),
            Ok(WireEvent::Block(b)) => Event::Block(BlockEvent {
                block_number: b.number,
            }),
            Err(e) => match serde_json::from_str::<EventKind>(frame) {
                Ok(EventKind {
                    event: Some(kind),
                }) if kind != "bounty" && kind != "block" => Event::Unknown {
                    reason: format!("unhandled event type {:?}", kind),
                },
                _ => Event::Malformed {
                    reason: e.to_string(),
                },
            },
        }
    }
}

impl From<PendingBounty> for BountyEvent {
    fn from(pending: PendingBounty) -> Self {
        Self {
            guid: pending.guid,
            artifact_uri: pending.uri,
            expiration_block: pending.expiration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUID: &str = "2b0a1f4e-5c1d-4c3a-9f2e-6f9d3b8a7c10";

    #[test]
    fn test_decode_bounty() {
        let frame = format!(
            r#"{{"event":"bounty","data":{{"guid":"{}","uri":"QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG","expiration":"123","amount":"1000"}}}}"#,
            GUID
        );
        match Event::decode(&frame) {
            Event::Bounty(b) => {
                assert_eq!(b.guid.to_string(), GUID);
                assert_eq!(b.artifact_uri, "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");
                assert_eq!(b.expiration_block, 123);
            }
            other => panic!("expected bounty, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_bounty_expiration_forms() {
        for (raw, expected) in [(r#""0x7b""#, 123), ("123", 123), (r#"" 42 ""#, 42)] {
            let frame = format!(
                r#"{{"event":"bounty","data":{{"guid":"{}","uri":"Qm","expiration":{}}}}}"#,
                GUID, raw
            );
            match Event::decode(&frame) {
                Event::Bounty(b) => assert_eq!(b.expiration_block, expected, "input {}", raw),
                other => panic!("expected bounty for {}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_decode_block() {
        assert_eq!(
            Event::decode(r#"{"event":"block","data":{"number":4096}}"#),
            Event::Block(BlockEvent { block_number: 4096 })
        );
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let frame = r#"{"event":"bounty","data":{"uri":"Qm","expiration":"1"}}"#;
        match Event::decode(frame) {
            Event::Malformed { reason } => assert!(reason.contains("guid"), "{}", reason),
            other => panic!("expected malformed, got {:?}", other),
        }

        let frame = r#"{"event":"block","data":{"number":"soon"}}"#;
        assert!(matches!(Event::decode(frame), Event::Malformed { .. }));
    }

    #[test]
    fn test_other_event_kinds_are_unknown() {
        match Event::decode(r#"{"event":"assertion","data":{}}"#) {
            Event::Unknown { reason } => assert!(reason.contains("assertion"), "{}", reason),
            other => panic!("expected unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(Event::decode("not json"), Event::Malformed { .. }));
        assert!(matches!(Event::decode("{}"), Event::Malformed { .. }));
        assert!(matches!(Event::decode(""), Event::Malformed { .. }));
    }

    #[test]
    fn test_pending_bounty_converts() {
        let pending = PendingBounty {
            guid: Uuid::nil(),
            uri: "Qm".into(),
            expiration: 7,
        };
        let event = BountyEvent::from(pending);
        assert_eq!(event.expiration_block, 7);
        assert_eq!(event.artifact_uri, "Qm");
    }
}
