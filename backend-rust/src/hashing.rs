//! # hashing
//!
//! Canonical JSON serialization and the SHA-256 digests built on it: the
//! round event hash committed at lock, and per-entry audit signatures.
//!
//! ## Canonical form
//! - arrays of events sorted by `timestamp_ms`, tie-break `event_id`
//! - object keys sorted lexicographically
//! - time-valued fields as ISO-8601 UTC with millisecond precision
//! - no insignificant whitespace
//!
//! Two runs over the same inputs produce byte-identical documents; anything
//! else is a bug that breaks the lock invariant.

use chrono::{DateTime, SecondsFormat, Utc};
use combat_types::CombatEvent;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// ISO-8601 UTC with millisecond precision, the only time format that may
/// enter a hashed document.
pub fn iso_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Serialize a JSON value canonically: sorted keys, compact separators.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // String escaping itself is infallible
            out.push_str(&serde_json::to_string(s).unwrap_or_default());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}

/// Event as a canonical JSON value: serde shape with `processed_at` rewritten
/// to millisecond precision.
fn canonical_event_value(event: &CombatEvent) -> Value {
    let mut value = serde_json::to_value(event).unwrap_or(Value::Null);
    if let Some(processed) = event.processed_at {
        if let Value::Object(map) = &mut value {
            map.insert("processed_at".to_string(), Value::String(iso_millis(processed)));
        }
    }
    value
}

/// SHA-256 over the canonical serialization of a round's ordered events.
/// Committed once at lock; recomputing from the persisted event list MUST
/// reproduce it.
pub fn event_hash(events: &[CombatEvent]) -> String {
    let mut ordered: Vec<&CombatEvent> = events.iter().collect();
    ordered.sort_by(|a, b| {
        a.timestamp_ms
            .cmp(&b.timestamp_ms)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
    let doc = canonical_string(&Value::Array(
        ordered.iter().map(|e| canonical_event_value(e)).collect(),
    ));
    sha256_hex(doc.as_bytes())
}

/// SHA-256 signature over a canonical payload (audit entries).
pub fn sign_payload(payload: &Value) -> String {
    sha256_hex(canonical_string(payload).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use combat_types::{Corner, EventMetadata, EventSource, EventType};
    use serde_json::json;

    fn event(id: &str, ts: i64) -> CombatEvent {
        CombatEvent {
            event_id: id.to_string(),
            bout_id: "b1".into(),
            round_id: "r1".into(),
            corner: Corner::Red,
            event_type: EventType::StrikeJab,
            severity: 0.5,
            confidence: 0.9,
            timestamp_ms: ts,
            source: EventSource::CvSystem,
            camera_id: None,
            angle_degrees: None,
            metadata: EventMetadata::default(),
            deduplicated: true,
            canonical: false,
            processed_at: None,
        }
    }

    #[test]
    fn canonical_string_sorts_keys_and_strips_whitespace() {
        let value = json!({"b": 2, "a": {"z": 1, "y": [1, 2]}});
        assert_eq!(canonical_string(&value), r#"{"a":{"y":[1,2],"z":1},"b":2}"#);
    }

    #[test]
    fn event_hash_is_order_independent() {
        let a = event("e1", 1000);
        let b = event("e2", 2000);
        let forward = event_hash(&[a.clone(), b.clone()]);
        let reversed = event_hash(&[b, a]);
        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 64);
    }

    #[test]
    fn event_hash_ties_break_on_event_id() {
        let a = event("aaa", 1000);
        let b = event("bbb", 1000);
        assert_eq!(event_hash(&[a.clone(), b.clone()]), event_hash(&[b, a]));
    }

    #[test]
    fn event_hash_changes_with_content() {
        let a = event("e1", 1000);
        let mut b = a.clone();
        b.severity = 0.6;
        assert_ne!(event_hash(&[a]), event_hash(&[b]));
    }

    #[test]
    fn sign_payload_matches_recompute() {
        let payload = json!({"action": "round_opened", "actor": "system"});
        assert_eq!(sign_payload(&payload), sign_payload(&payload));
    }
}
