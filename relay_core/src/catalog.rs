//! Canned demo scenarios.
//!
//! The catalog mirrors the swarm demo's script: agents spawn, chat, broadcast,
//! drive a PTY, lose and regain a worker, then wind down. Steps are spaced
//! evenly by a cadence; only `relay_demo` carries hand-tuned offsets.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::event::{EventPayload, HealthStatus, MemberAction, PtyStream};
use crate::scenario::{Scenario, ScenarioStep, SessionTemplate};

pub const DEMO_AGENTS: [&str; 4] = ["Lead", "Worker-1", "Worker-2", "Worker-3"];

/// Default spacing between catalog steps (5 events per second).
pub const DEFAULT_CADENCE_MS: u64 = 200;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Built-in default: one PTY session running the test suite
    RelayDemo,

    /// Lead opens a PTY and spawns two workers
    SpawnSequence,

    /// Eight direct messages between random agent pairs
    MessageFlurry,

    /// Urgent broadcast followed by acknowledgements
    Broadcast,

    /// Conversation on the `general` channel
    ChannelChat,

    /// PTY output and a daemon health report
    PtyActivity,

    /// Worker drops out and reconnects
    ErrorRecovery,

    /// Workers finish and leave
    ReleaseSequence,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::RelayDemo,
            ScenarioId::SpawnSequence,
            ScenarioId::MessageFlurry,
            ScenarioId::Broadcast,
            ScenarioId::ChannelChat,
            ScenarioId::PtyActivity,
            ScenarioId::ErrorRecovery,
            ScenarioId::ReleaseSequence,
        ]
    }

    /// The swarm story, in the order the continuous stream cycles through it.
    pub fn story() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SpawnSequence,
            ScenarioId::MessageFlurry,
            ScenarioId::Broadcast,
            ScenarioId::ChannelChat,
            ScenarioId::PtyActivity,
            ScenarioId::ErrorRecovery,
            ScenarioId::ReleaseSequence,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::RelayDemo => "relay_demo",
            ScenarioId::SpawnSequence => "spawn_sequence",
            ScenarioId::MessageFlurry => "message_flurry",
            ScenarioId::Broadcast => "broadcast",
            ScenarioId::ChannelChat => "channel_chat",
            ScenarioId::PtyActivity => "pty_activity",
            ScenarioId::ErrorRecovery => "error_recovery",
            ScenarioId::ReleaseSequence => "release_sequence",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::RelayDemo => "PTY session running npm test, with agent chatter and a latency warning",
            ScenarioId::SpawnSequence => "Lead opens a PTY, spawns Worker-1 and Worker-2, workers ACK",
            ScenarioId::MessageFlurry => "8 direct messages between random agent pairs (seeded)",
            ScenarioId::Broadcast => "Urgent broadcast from Lead, three ACKs",
            ScenarioId::ChannelChat => "Bug triage on the general channel",
            ScenarioId::PtyActivity => "Test output streamed from a PTY, daemon reports healthy",
            ScenarioId::ErrorRecovery => "Worker-2 times out, leaves, rejoins and resumes",
            ScenarioId::ReleaseSequence => "Workers report DONE, leave, PTY exits",
        }
    }

    /// Builds the scenario script.
    ///
    /// `seed` only matters for randomized scenarios; `cadence_ms` spaces
    /// catalog steps (ignored by `relay_demo`).
    pub fn build(&self, seed: u64, cadence_ms: u64) -> Scenario {
        let steps = match self {
            ScenarioId::RelayDemo => return Scenario::relay_demo(),
            ScenarioId::SpawnSequence => spawn_sequence(),
            ScenarioId::MessageFlurry => message_flurry(seed),
            ScenarioId::Broadcast => broadcast(),
            ScenarioId::ChannelChat => channel_chat(),
            ScenarioId::PtyActivity => pty_activity(),
            ScenarioId::ErrorRecovery => error_recovery(),
            ScenarioId::ReleaseSequence => release_sequence(),
        };

        Scenario {
            name: self.name().to_string(),
            session: SessionTemplate {
                command: format!("relay swarm demo ({})", self.name()),
                tags: vec!["demo".into(), "swarm".into()],
                agents: DEMO_AGENTS.iter().map(|a| a.to_string()).collect(),
            },
            steps: steps
                .into_iter()
                .enumerate()
                .map(|(i, mut step)| {
                    step.at = i as u64 * cadence_ms;
                    step
                })
                .collect(),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "relay_demo" | "default" => Ok(ScenarioId::RelayDemo),
            "spawn_sequence" | "spawn" => Ok(ScenarioId::SpawnSequence),
            "message_flurry" | "flurry" => Ok(ScenarioId::MessageFlurry),
            "broadcast" => Ok(ScenarioId::Broadcast),
            "channel_chat" | "chat" => Ok(ScenarioId::ChannelChat),
            "pty_activity" | "pty" => Ok(ScenarioId::PtyActivity),
            "error_recovery" | "recovery" => Ok(ScenarioId::ErrorRecovery),
            "release_sequence" | "release" => Ok(ScenarioId::ReleaseSequence),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

// =============================================================================
// SCRIPTS
// =============================================================================

fn msg(body: &str) -> EventPayload {
    EventPayload::AgentMsg {
        body: body.into(),
        text: None,
        is_broadcast: false,
        is_urgent: false,
        channel: None,
        thread: None,
    }
}

fn channel_msg(body: &str, channel: &str) -> EventPayload {
    EventPayload::AgentMsg {
        body: body.into(),
        text: None,
        is_broadcast: false,
        is_urgent: false,
        channel: Some(channel.into()),
        thread: None,
    }
}

fn member(action: MemberAction, name: &str) -> EventPayload {
    EventPayload::SystemState {
        action,
        member: name.into(),
        channel: None,
    }
}

fn daemon(component: &str, status: HealthStatus, detail: &str) -> EventPayload {
    EventPayload::DaemonStatus {
        component: component.into(),
        status,
        detail: Some(detail.into()),
    }
}

fn spawned(role: &str, by: Option<&str>) -> EventPayload {
    EventPayload::AgentSpawn {
        name: None,
        role: Some(role.into()),
        spawned_by: by.map(str::to_string),
    }
}

fn released() -> EventPayload {
    EventPayload::AgentRelease {
        reason: Some("task complete".into()),
    }
}

fn stdout(pty_id: &str, data: &str) -> EventPayload {
    EventPayload::PtyIo {
        pty_id: pty_id.into(),
        stream: PtyStream::Stdout,
        data: data.into(),
        len: data.len() as u64,
    }
}

fn spawn_sequence() -> Vec<ScenarioStep> {
    vec![
        ScenarioStep::new(
            0,
            "Lead",
            EventPayload::PtyOpen {
                pty_id: "pty-lead".into(),
                cmd: "claude".into(),
                cwd: "/workspace".into(),
                env: None,
            },
        ),
        ScenarioStep::new(0, "daemon", member(MemberAction::Join, "Lead")),
        ScenarioStep::new(0, "Lead", spawned("lead", None)),
        ScenarioStep::new(0, "Lead", msg("Spawning Worker-1 for task A")).to("Worker-1"),
        ScenarioStep::new(0, "daemon", member(MemberAction::Join, "Worker-1")),
        ScenarioStep::new(0, "Worker-1", spawned("worker", Some("Lead"))),
        ScenarioStep::new(0, "Lead", msg("Spawning Worker-2 for task B")).to("Worker-2"),
        ScenarioStep::new(0, "daemon", member(MemberAction::Join, "Worker-2")),
        ScenarioStep::new(0, "Worker-2", spawned("worker", Some("Lead"))),
        ScenarioStep::new(0, "Worker-1", msg("ACK: Starting task A")).to("Lead"),
        ScenarioStep::new(0, "Worker-2", msg("ACK: Starting task B")).to("Lead"),
    ]
}

fn message_flurry(seed: u64) -> Vec<ScenarioStep> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..8)
        .map(|i| {
            let pair: Vec<&&str> = DEMO_AGENTS.choose_multiple(&mut rng, 2).collect();
            let body = format!("Status update #{}: progress on subtask", i + 1);
            ScenarioStep::new(0, *pair[0], msg(&body)).to(*pair[1])
        })
        .collect()
}

fn broadcast() -> Vec<ScenarioStep> {
    let mut steps = vec![ScenarioStep::new(
        0,
        "Lead",
        EventPayload::AgentMsg {
            body: "ATTENTION: All agents sync checkpoint".into(),
            text: None,
            is_broadcast: true,
            is_urgent: true,
            channel: None,
            thread: None,
        },
    )];
    for worker in &DEMO_AGENTS[1..] {
        steps.push(ScenarioStep::new(0, *worker, msg("ACK: Checkpoint received")).to("Lead"));
    }
    steps
}

fn channel_chat() -> Vec<ScenarioStep> {
    [
        ("Worker-1", "Found a bug in the auth module"),
        ("Worker-2", "Can you share the stack trace?"),
        ("Worker-1", "TypeError at line 42, null reference"),
        ("Lead", "Good catch, Worker-2 please assist"),
    ]
    .into_iter()
    .map(|(from, body)| ScenarioStep::new(0, from, channel_msg(body, "general")).on_channel("general"))
    .collect()
}

fn pty_activity() -> Vec<ScenarioStep> {
    let pty = "pty-worker-1";
    vec![
        ScenarioStep::new(0, "Worker-1", stdout(pty, "Running tests...\n")),
        ScenarioStep::new(0, "Worker-1", stdout(pty, "Test 1/5 passed\n")),
        ScenarioStep::new(0, "Worker-1", stdout(pty, "Test 2/5 passed\n")),
        ScenarioStep::new(0, "daemon", daemon("relay-pty", HealthStatus::Ok, "All PTY sessions healthy")),
    ]
}

fn error_recovery() -> Vec<ScenarioStep> {
    vec![
        ScenarioStep::new(0, "daemon", daemon("Worker-2", HealthStatus::Error, "Connection timeout")),
        ScenarioStep::new(0, "daemon", member(MemberAction::Leave, "Worker-2")),
        ScenarioStep::new(0, "daemon", daemon("relay", HealthStatus::Warn, "Agent count reduced to 3")),
        ScenarioStep::new(0, "daemon", member(MemberAction::Join, "Worker-2")),
        ScenarioStep::new(0, "daemon", daemon("relay", HealthStatus::Ok, "All agents reconnected")),
        ScenarioStep::new(0, "Worker-2", msg("Reconnected, resuming task")).to("Lead"),
    ]
}

fn release_sequence() -> Vec<ScenarioStep> {
    vec![
        ScenarioStep::new(0, "Worker-1", msg("DONE: Task A complete")).to("Lead"),
        ScenarioStep::new(0, "Worker-2", msg("DONE: Task B complete")).to("Lead"),
        ScenarioStep::new(0, "daemon", member(MemberAction::Leave, "Worker-1")),
        ScenarioStep::new(0, "Worker-1", released()),
        ScenarioStep::new(
            0,
            "Worker-1",
            EventPayload::PtyExit {
                pty_id: "pty-worker-1".into(),
                code: 0,
                signal: None,
            },
        ),
        ScenarioStep::new(0, "daemon", member(MemberAction::Leave, "Worker-2")),
        ScenarioStep::new(0, "Worker-2", released()),
        ScenarioStep::new(0, "daemon", daemon("relay", HealthStatus::Ok, "Session winding down")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
        }
        assert_eq!("Error-Recovery".parse::<ScenarioId>(), Ok(ScenarioId::ErrorRecovery));
        assert!("nope".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_catalog_steps_are_evenly_spaced() {
        let scenario = ScenarioId::ErrorRecovery.build(1, 250);
        let offsets: Vec<u64> = scenario.steps.iter().map(|s| s.at).collect();
        assert_eq!(offsets, vec![0, 250, 500, 750, 1000, 1250]);
        assert_eq!(scenario.name, "error_recovery");
    }

    #[test]
    fn test_relay_demo_ignores_cadence() {
        assert_eq!(ScenarioId::RelayDemo.build(9, 1), Scenario::relay_demo());
    }

    #[test]
    fn test_message_flurry_is_seeded() {
        let a = ScenarioId::MessageFlurry.build(42, DEFAULT_CADENCE_MS);
        let b = ScenarioId::MessageFlurry.build(42, DEFAULT_CADENCE_MS);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);

        for step in &a.steps {
            assert_ne!(Some(step.source.as_str()), step.target.as_deref());
        }
    }

    #[test]
    fn test_pty_activity_declares_real_lengths() {
        let scenario = ScenarioId::PtyActivity.build(0, DEFAULT_CADENCE_MS);
        assert_eq!(scenario.total_io_bytes(), 17 + 16 + 16);
    }

    #[test]
    fn test_story_excludes_default() {
        assert!(!ScenarioId::story().contains(&ScenarioId::RelayDemo));
        assert_eq!(ScenarioId::story().len() + 1, ScenarioId::all().len());
    }
}
