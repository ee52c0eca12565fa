//! The server → client envelope and client → server control frames.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A sequenced, typed wrapper around a single broker record, as delivered to
/// one client.
///
/// `data` is carried as `Box<RawValue>` end to end: the gateway never parses
/// the broker payload, only re-emits it verbatim, matching the at-least-once
/// "opaque bytes are forwarded" contract and avoiding a deserialize/serialize
/// round trip on the hot fan-out path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Monotonically increasing, unique and gap-free per client, starting at 1.
    pub seq: i64,
    /// Wall-clock milliseconds at wrap time.
    pub ts: i64,
    /// The envelope's type tag, derived from the originating topic.
    #[serde(rename = "type")]
    pub kind: String,
    /// The verbatim broker payload.
    pub data: Box<RawValue>,
}

impl Envelope {
    /// Construct an envelope. `seq` and `ts` are assigned by the caller (the
    /// owning shard, via its [`crate::sequence::SequenceGenerator`] and clock).
    #[must_use]
    pub const fn new(seq: i64, ts: i64, kind: String, data: Box<RawValue>) -> Self {
        Self { seq, ts, kind, data }
    }

    /// Wrap a [`BroadcastRecord`] for one subscriber, assigning `seq`.
    #[must_use]
    pub fn from_broadcast(seq: i64, record: &BroadcastRecord) -> Self {
        Self { seq, ts: record.ts, kind: record.type_tag.to_string(), data: record.data.clone() }
    }
}

/// A single broker record, already mapped to its destination channel and
/// envelope type tag, as it travels from the consumer pool onto a shard's
/// broadcast channel.
///
/// Unlike [`Envelope`], this carries no `seq` — the consumer pool fans one
/// `BroadcastRecord` out to every interested shard, and each shard assigns a
/// distinct `seq` per subscriber when it wraps this into an [`Envelope`].
#[derive(Debug, Clone)]
pub struct BroadcastRecord {
    /// The envelope `type` tag, derived from the originating topic.
    pub type_tag: &'static str,
    /// Wall-clock milliseconds at consume time.
    pub ts: i64,
    /// The verbatim broker payload.
    pub data: Box<RawValue>,
}

impl BroadcastRecord {
    /// Build a broadcast record from a decoded topic and raw payload bytes.
    #[must_use]
    pub const fn new(type_tag: &'static str, ts: i64, data: Box<RawValue>) -> Self {
        Self { type_tag, ts, data }
    }
}

/// A client → server control frame, `{"type": "<verb>", "data": <payload>}`.
///
/// An unrecognized verb or malformed `data` shape fails to deserialize into
/// this type; the connection handler treats that `Err` the same way it
/// treats any other protocol violation — a warning log and a best-effort
/// error frame, never a disconnect.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Control {
    /// `{"type":"subscribe","data":{"channels":[...]}}` or
    /// `{"type":"subscribe","data":{"bundle":"TRADING","tokens":[...]}}`.
    Subscribe(SubscribeRequest),
    /// `{"type":"unsubscribe","data":{"channels":[...]}}`.
    Unsubscribe { channels: Vec<String> },
    /// `{"type":"replay","data":{"from":N,"to":N}}` or `{"since":N}`.
    Replay(ReplayRequest),
    /// `{"type":"heartbeat"}`.
    Heartbeat,
    /// `{"type":"pong"}`.
    Pong,
}

/// The two accepted shapes of a `subscribe` control frame's `data` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubscribeRequest {
    /// An explicit channel list.
    Channels { channels: Vec<String> },
    /// A named bundle expanded server-side against a token list.
    Bundle { bundle: String, tokens: Vec<String> },
}

/// The two accepted shapes of a `replay` control frame's `data` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReplayRequest {
    /// Inclusive `[from, to]` range.
    Range { from: i64, to: i64 },
    /// Everything strictly after `since`.
    Since { since: i64 },
}

/// A server → client error frame, offered best-effort on protocol violations
/// and rate-limit breaches; never causes a disconnect by itself.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Human-readable, non-sensitive description of what was rejected.
    pub message: String,
}

impl ErrorFrame {
    /// Build an error frame with the given message.
    #[must_use]
    pub const fn new(message: String) -> Self {
        Self { kind: "error", message }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let data = RawValue::from_string(r#"{"p":1}"#.to_string()).unwrap();
        let env = Envelope::new(1, 1_700_000_000_000, "trade".to_string(), data);
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"seq\":1"));
        assert!(json.contains("\"type\":\"trade\""));
        assert!(json.contains("\"p\":1"));
    }

    #[test]
    fn from_broadcast_assigns_seq_and_copies_record_fields() {
        let data = RawValue::from_string(r#"{"p":1}"#.to_string()).unwrap();
        let record = BroadcastRecord::new("trade", 1_700_000_000_000, data);
        let env = Envelope::from_broadcast(7, &record);
        assert_eq!(env.seq, 7);
        assert_eq!(env.ts, record.ts);
        assert_eq!(env.kind, "trade");
        assert_eq!(env.data.get(), record.data.get());
    }

    #[test]
    fn control_subscribe_with_channels_parses() {
        let raw = r#"{"type":"subscribe","data":{"channels":["token.BTC"]}}"#;
        let ctrl: Control = serde_json::from_str(raw).unwrap();
        match ctrl {
            Control::Subscribe(SubscribeRequest::Channels { channels }) => {
                assert_eq!(channels, vec!["token.BTC".to_string()]);
            },
            _ => panic!("expected Subscribe(Channels)"),
        }
    }

    #[test]
    fn control_subscribe_with_bundle_parses() {
        let raw = r#"{"type":"subscribe","data":{"bundle":"TRADING","tokens":["BTC"]}}"#;
        let ctrl: Control = serde_json::from_str(raw).unwrap();
        assert!(matches!(ctrl, Control::Subscribe(SubscribeRequest::Bundle { .. })));
    }

    #[test]
    fn control_replay_since_and_range_both_parse() {
        let since: Control = serde_json::from_str(r#"{"type":"replay","data":{"since":5}}"#).unwrap();
        assert!(matches!(since, Control::Replay(ReplayRequest::Since { since: 5 })));

        let range: Control =
            serde_json::from_str(r#"{"type":"replay","data":{"from":3,"to":3}}"#).unwrap();
        assert!(matches!(range, Control::Replay(ReplayRequest::Range { from: 3, to: 3 })));
    }

    #[test]
    fn control_heartbeat_has_no_data_field() {
        let ctrl: Control = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(matches!(ctrl, Control::Heartbeat));
    }
}
