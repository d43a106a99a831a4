//! Relay timeline logs (JSONL).
//!
//! Each line is an envelope tagged by `type`: `message` entries carry a relay
//! message, `status` entries carry delivery updates and are not part of the
//! timeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::Result;

/// Sender used by the relay for its own bookkeeping messages.
pub const SYSTEM_SENDER: &str = "__system__";

/// Colors assigned to agents in sorted name order, wrapping around.
pub const AGENT_PALETTE: [&str; 10] = [
    "#3B82F6", "#10B981", "#F59E0B", "#EF4444", "#8B5CF6", "#EC4899", "#06B6D4", "#84CC16",
    "#F97316", "#6366F1",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub id: String,
    /// Milliseconds since the epoch (any JSON number)
    pub ts: f64,
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub is_broadcast: bool,
    #[serde(rename = "deliverySeq", default, skip_serializing_if = "Option::is_none")]
    pub delivery_seq: Option<u64>,
    #[serde(rename = "deliverySessionId", default, skip_serializing_if = "Option::is_none")]
    pub delivery_session_id: Option<String>,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl LogMessage {
    /// Channel messages are addressed to `#name`.
    pub fn is_channel(&self) -> bool {
        self.to.starts_with('#')
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LogEntry {
    Message {
        #[serde(default)]
        message: Option<LogMessage>,
    },
    #[allow(dead_code)]
    Status {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        ts: Option<f64>,
    },
}

/// Parses a JSONL log into timeline messages.
///
/// Lines that fail to parse are skipped. The result is sorted by timestamp
/// (ties keep file order) with the first occurrence of each id kept.
pub fn parse_messages(jsonl: &str) -> Vec<LogMessage> {
    let mut messages = Vec::new();

    for line in jsonl.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<LogEntry>(line) {
            Ok(LogEntry::Message { message: Some(msg) }) => {
                if msg.from != SYSTEM_SENDER {
                    messages.push(msg);
                }
            }
            Ok(_) => {}
            Err(e) => {
                let preview: String = line.chars().take(100).collect();
                warn!(error = %e, line = %preview, "skipping unparseable log line");
            }
        }
    }

    messages.sort_by(|a, b| a.ts.total_cmp(&b.ts));

    let mut seen = HashSet::new();
    messages.retain(|m| seen.insert(m.id.clone()));

    debug!(count = messages.len(), "parsed timeline log");
    messages
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<LogMessage>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_messages(&content))
}

/// Maps every sender and direct recipient to a palette color.
pub fn agent_colors(messages: &[LogMessage]) -> BTreeMap<String, &'static str> {
    let mut agents = BTreeSet::new();
    for msg in messages {
        agents.insert(msg.from.clone());
        if !msg.is_channel() {
            agents.insert(msg.to.clone());
        }
    }

    agents
        .into_iter()
        .enumerate()
        .map(|(i, agent)| (agent, AGENT_PALETTE[i % AGENT_PALETTE.len()]))
        .collect()
}
