//! Event Model
//! ===========
//!
//! The unit of playback is an [`Event`]: a materialized payload plus the
//! envelope fields (id, timestamp, session, actors, routing).
//!
//! The payload is a closed sum type tagged by `type` (`"pty/io"`,
//! `"agent/msg"`, ...). An event's [`EventKind`] is never stored: it is
//! derived from the payload tag prefix every time it is asked for, so the two
//! cannot drift apart.

use chrono::{DateTime, Utc};
use relay_env::EventId;
use serde::{Deserialize, Serialize, Serializer};

// =============================================================================
// KIND
// =============================================================================

/// Closed classification of an event's payload tag prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Pty,
    Agent,
    Daemon,
    Relay,
    System,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Pty => "pty",
            EventKind::Agent => "agent",
            EventKind::Daemon => "daemon",
            EventKind::Relay => "relay",
            EventKind::System => "system",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a payload tag by prefix.
///
/// Unrecognized prefixes fall back to [`EventKind::System`].
pub fn classify_tag(tag: &str) -> EventKind {
    if tag.starts_with("pty/") {
        EventKind::Pty
    } else if tag.starts_with("agent/") {
        EventKind::Agent
    } else if tag.starts_with("daemon/") {
        EventKind::Daemon
    } else if tag.starts_with("relay/") {
        EventKind::Relay
    } else {
        EventKind::System
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtyStream {
    Stdout,
    Stdin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberAction {
    Join,
    Leave,
}

/// Tagged payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "pty/open", rename_all = "camelCase")]
    PtyOpen {
        pty_id: String,
        cmd: String,
        cwd: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env: Option<Vec<String>>,
    },

    #[serde(rename = "pty/io", rename_all = "camelCase")]
    PtyIo {
        pty_id: String,
        stream: PtyStream,
        data: String,
        /// Declared byte length (counted into session I/O stats)
        len: u64,
    },

    #[serde(rename = "pty/exit", rename_all = "camelCase")]
    PtyExit {
        pty_id: String,
        code: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<String>,
    },

    /// `message/send` is the legacy tag for the same payload.
    #[serde(rename = "agent/msg", alias = "message/send", rename_all = "camelCase")]
    AgentMsg {
        #[serde(default)]
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default)]
        is_broadcast: bool,
        #[serde(default)]
        is_urgent: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread: Option<String>,
    },

    #[serde(rename = "agent/spawn", rename_all = "camelCase")]
    AgentSpawn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spawned_by: Option<String>,
    },

    #[serde(rename = "agent/release")]
    AgentRelease {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[serde(rename = "agent/state")]
    AgentState { status: String },

    #[serde(rename = "daemon/status")]
    DaemonStatus {
        component: String,
        status: HealthStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    #[serde(rename = "relay/spawn")]
    RelaySpawn { name: String, cli: String },

    #[serde(rename = "relay/release")]
    RelayRelease {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[serde(rename = "system/state")]
    SystemState {
        action: MemberAction,
        member: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
}

impl EventPayload {
    /// Returns the canonical `type` tag.
    pub fn tag(&self) -> &'static str {
        match self {
            EventPayload::PtyOpen { .. } => "pty/open",
            EventPayload::PtyIo { .. } => "pty/io",
            EventPayload::PtyExit { .. } => "pty/exit",
            EventPayload::AgentMsg { .. } => "agent/msg",
            EventPayload::AgentSpawn { .. } => "agent/spawn",
            EventPayload::AgentRelease { .. } => "agent/release",
            EventPayload::AgentState { .. } => "agent/state",
            EventPayload::DaemonStatus { .. } => "daemon/status",
            EventPayload::RelaySpawn { .. } => "relay/spawn",
            EventPayload::RelayRelease { .. } => "relay/release",
            EventPayload::SystemState { .. } => "system/state",
        }
    }

    pub fn kind(&self) -> EventKind {
        classify_tag(self.tag())
    }

    /// The part of the tag after `/` (the whole tag when there is none).
    pub fn subtype(&self) -> &'static str {
        let tag = self.tag();
        tag.split_once('/').map(|(_, sub)| sub).unwrap_or(tag)
    }

    /// Declared byte length for I/O payloads, 0 for everything else.
    pub fn io_bytes(&self) -> u64 {
        match self {
            EventPayload::PtyIo { len, .. } => *len,
            _ => 0,
        }
    }

    /// Channel carried inside an agent message, if any.
    pub fn channel(&self) -> Option<&str> {
        match self {
            EventPayload::AgentMsg { channel, .. } => channel.as_deref(),
            _ => None,
        }
    }

    /// Message text, preferring the canonical body over the legacy alias.
    pub fn message_text(&self) -> Option<&str> {
        match self {
            EventPayload::AgentMsg { body, text, .. } => {
                if body.is_empty() {
                    Some(text.as_deref().unwrap_or(""))
                } else {
                    Some(body.as_str())
                }
            }
            _ => None,
        }
    }
}

// =============================================================================
// EVENT
// =============================================================================

/// One materialized unit of playback output.
///
/// Immutable once emitted. `kind` and `subtype` are derived from the payload
/// and appear in the serialized form but are ignored when deserializing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub ts: DateTime<Utc>,
    pub session_id: String,
    pub source: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub thread: Option<String>,
    pub payload: EventPayload,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn subtype(&self) -> &'static str {
        self.payload.subtype()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventWire<'a> {
    id: &'a EventId,
    ts: &'a DateTime<Utc>,
    session_id: &'a str,
    kind: EventKind,
    subtype: &'static str,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread: Option<&'a str>,
    payload: &'a EventPayload,
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EventWire {
            id: &self.id,
            ts: &self.ts,
            session_id: &self.session_id,
            kind: self.kind(),
            subtype: self.subtype(),
            source: &self.source,
            target: self.target.as_deref(),
            channel: self.channel.as_deref(),
            thread: self.thread.as_deref(),
            payload: &self.payload,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io(len: u64) -> EventPayload {
        EventPayload::PtyIo {
            pty_id: "pty-1".into(),
            stream: PtyStream::Stdout,
            data: "x".repeat(len as usize),
            len,
        }
    }

    #[test]
    fn test_classify_tag_prefixes() {
        assert_eq!(classify_tag("pty/io"), EventKind::Pty);
        assert_eq!(classify_tag("agent/msg"), EventKind::Agent);
        assert_eq!(classify_tag("daemon/status"), EventKind::Daemon);
        assert_eq!(classify_tag("relay/spawn"), EventKind::Relay);
        assert_eq!(classify_tag("system/state"), EventKind::System);
    }

    #[test]
    fn test_classify_unknown_prefix_falls_back_to_system() {
        assert_eq!(classify_tag("custom/thing"), EventKind::System);
        assert_eq!(classify_tag("pty"), EventKind::System);
        assert_eq!(classify_tag(""), EventKind::System);
    }

    #[test]
    fn test_kind_and_subtype_follow_tag() {
        let payload = io(4);
        assert_eq!(payload.kind(), EventKind::Pty);
        assert_eq!(payload.subtype(), "io");

        let exit = EventPayload::PtyExit { pty_id: "p".into(), code: 0, signal: None };
        assert_eq!(exit.subtype(), "exit");
    }

    #[test]
    fn test_io_bytes_only_for_io_payloads() {
        assert_eq!(io(27).io_bytes(), 27);
        let status = EventPayload::DaemonStatus {
            component: "relay".into(),
            status: HealthStatus::Ok,
            detail: None,
        };
        assert_eq!(status.io_bytes(), 0);
    }

    #[test]
    fn test_payload_json_uses_type_tag() {
        let json = serde_json::to_value(io(3)).unwrap();
        assert_eq!(json["type"], "pty/io");
        assert_eq!(json["ptyId"], "pty-1");
        assert_eq!(json["len"], 3);
    }

    #[test]
    fn test_legacy_message_send_alias() {
        let payload: EventPayload =
            serde_json::from_str(r#"{"type":"message/send","text":"hi","isUrgent":true}"#).unwrap();
        assert_eq!(payload.tag(), "agent/msg");
        assert_eq!(payload.message_text(), Some("hi"));
        match payload {
            EventPayload::AgentMsg { is_urgent, is_broadcast, .. } => {
                assert!(is_urgent);
                assert!(!is_broadcast);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_derived_kind() {
        let event = Event {
            id: EventId::from_random_bytes([3u8; 16]),
            ts: DateTime::<Utc>::from(std::time::UNIX_EPOCH),
            session_id: "s".into(),
            source: "Agent-A".into(),
            target: None,
            channel: Some("#general".into()),
            thread: None,
            payload: EventPayload::AgentMsg {
                body: "hello".into(),
                text: None,
                is_broadcast: false,
                is_urgent: false,
                channel: Some("#general".into()),
                thread: None,
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "agent");
        assert_eq!(json["subtype"], "msg");
        assert_eq!(json["sessionId"], "s");
        assert!(json.get("target").is_none());

        // Derived fields are ignored on the way back in.
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
