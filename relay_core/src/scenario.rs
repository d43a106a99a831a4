//! Scenarios: static, ordered scripts of event templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{EventPayload, HealthStatus, PtyStream};

/// One event template with its offset from scenario start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Milliseconds since scenario start (non-decreasing along the script)
    pub at: u64,
    pub payload: EventPayload,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
}

impl ScenarioStep {
    pub fn new(at: u64, source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            at,
            payload,
            source: source.into(),
            target: None,
            channel: None,
            thread: None,
        }
    }

    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn in_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Channel of the materialized event: the step's own, else the one
    /// carried by an agent message payload.
    pub fn resolved_channel(&self) -> Option<String> {
        self.channel
            .clone()
            .or_else(|| self.payload.channel().map(str::to_string))
    }
}

/// Session fields a scenario contributes to the published metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTemplate {
    pub command: String,
    pub tags: Vec<String>,
    pub agents: Vec<String>,
}

/// A named replay script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub session: SessionTemplate,
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Milliseconds between step `index` and its predecessor (step 0 is
    /// measured from scenario start). Out-of-order offsets clamp to 0.
    pub fn gap_ms(&self, index: usize) -> u64 {
        let Some(step) = self.steps.get(index) else {
            return 0;
        };
        let prev_at = if index == 0 { 0 } else { self.steps[index - 1].at };
        step.at.saturating_sub(prev_at)
    }

    /// Offset of the last step, i.e. the scenario length at speed 1.
    pub fn total_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.at).max().unwrap_or(0)
    }

    /// Sum of declared I/O lengths over the whole script.
    pub fn total_io_bytes(&self) -> u64 {
        self.steps.iter().map(|s| s.payload.io_bytes()).sum()
    }

    /// The built-in deterministic demo: a PTY session running `npm test`.
    pub fn relay_demo() -> Self {
        let pty = "pty-1";
        let io = |data: &str, len: u64| EventPayload::PtyIo {
            pty_id: pty.into(),
            stream: PtyStream::Stdout,
            data: data.into(),
            len,
        };
        let msg = |body: &str| EventPayload::AgentMsg {
            body: body.into(),
            text: None,
            is_broadcast: false,
            is_urgent: false,
            channel: Some("#general".into()),
            thread: None,
        };

        Self {
            name: "relay_demo".into(),
            session: SessionTemplate {
                command: "relay-pty demo".into(),
                tags: vec!["demo".into(), "simulated".into()],
                agents: vec!["daemon".into(), "relay-pty".into(), "Agent-A".into()],
            },
            steps: vec![
                ScenarioStep::new(
                    0,
                    "daemon",
                    EventPayload::PtyOpen {
                        pty_id: pty.into(),
                        cmd: "npm test".into(),
                        cwd: "/workspace".into(),
                        env: None,
                    },
                ),
                ScenarioStep::new(
                    80,
                    "daemon",
                    EventPayload::DaemonStatus {
                        component: "relay".into(),
                        status: HealthStatus::Ok,
                        detail: None,
                    },
                ),
                ScenarioStep::new(140, "Agent-A", msg("Agent connected to PTY")).to("#general"),
                ScenarioStep::new(220, pty, io("Running tests...\n", 16)),
                ScenarioStep::new(320, pty, io("PASS  api/routes.spec.ts\n", 27)),
                ScenarioStep::new(420, "Agent-A", msg("Tests green ✅")).to("#general"),
                ScenarioStep::new(
                    520,
                    "daemon",
                    EventPayload::DaemonStatus {
                        component: "relay".into(),
                        status: HealthStatus::Warn,
                        detail: Some("Intermittent latency spike".into()),
                    },
                ),
                ScenarioStep::new(
                    680,
                    "daemon",
                    EventPayload::PtyExit {
                        pty_id: pty.into(),
                        code: 0,
                        signal: None,
                    },
                ),
            ],
        }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::relay_demo()
    }
}

/// Running totals over emitted events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub event_count: u64,
    pub io_bytes: u64,
}

impl SessionStats {
    pub fn record(&mut self, payload: &EventPayload) {
        self.event_count += 1;
        self.io_bytes += payload.io_bytes();
    }
}

/// Published session metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub command: String,
    pub tags: Vec<String>,
    pub agents: Vec<String>,
    pub stats: SessionStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn open(id: String, started_at: DateTime<Utc>, template: &SessionTemplate) -> Self {
        Self {
            id,
            started_at,
            command: template.command.clone(),
            tags: template.tags.clone(),
            agents: template.agents.clone(),
            stats: SessionStats::default(),
            last_event_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(at: u64) -> ScenarioStep {
        ScenarioStep::new(
            at,
            "daemon",
            EventPayload::DaemonStatus {
                component: "relay".into(),
                status: HealthStatus::Ok,
                detail: None,
            },
        )
    }

    #[test]
    fn test_relay_demo_shape() {
        let demo = Scenario::relay_demo();
        let offsets: Vec<u64> = demo.steps.iter().map(|s| s.at).collect();
        assert_eq!(offsets, vec![0, 80, 140, 220, 320, 420, 520, 680]);
        assert_eq!(demo.total_ms(), 680);
        assert_eq!(demo.total_io_bytes(), 43);
        assert_eq!(demo.session.command, "relay-pty demo");
    }

    #[test]
    fn test_gap_is_relative_to_previous_step() {
        let scenario = Scenario {
            name: "gaps".into(),
            session: Scenario::relay_demo().session,
            steps: vec![status(0), status(100), status(100), status(250)],
        };
        assert_eq!(scenario.gap_ms(0), 0);
        assert_eq!(scenario.gap_ms(1), 100);
        assert_eq!(scenario.gap_ms(2), 0);
        assert_eq!(scenario.gap_ms(3), 150);
        assert_eq!(scenario.gap_ms(9), 0);
    }

    #[test]
    fn test_out_of_order_offsets_clamp_to_zero() {
        let scenario = Scenario {
            name: "backwards".into(),
            session: Scenario::relay_demo().session,
            steps: vec![status(200), status(50)],
        };
        assert_eq!(scenario.gap_ms(0), 200);
        assert_eq!(scenario.gap_ms(1), 0);
    }

    #[test]
    fn test_resolved_channel_falls_back_to_payload() {
        let demo = Scenario::relay_demo();
        assert_eq!(demo.steps[2].resolved_channel().as_deref(), Some("#general"));
        assert_eq!(demo.steps[0].resolved_channel(), None);

        let explicit = status(0).on_channel("ops");
        assert_eq!(explicit.resolved_channel().as_deref(), Some("ops"));
    }

    #[test]
    fn test_session_stats_record() {
        let mut stats = SessionStats::default();
        for step in &Scenario::relay_demo().steps {
            stats.record(&step.payload);
        }
        assert_eq!(stats.event_count, 8);
        assert_eq!(stats.io_bytes, 43);
    }
}
