//! Scenario runner - replays catalog scenarios on a virtual clock and checks
//! the playback.

use crate::context::SimContext;

use relay_core::catalog::{ScenarioId, DEFAULT_CADENCE_MS};
use relay_core::player::scaled_delay;
use relay_core::stores::EventStats;
use relay_core::{Event, Player, PlayerState, RelayConfig, Scenario, Session, StoreHub};
use relay_env::RelayContext;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, warn};

/// Results from replaying a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Speed multiplier used
    pub speed: f64,

    /// Whether playback passed all checks
    pub passed: bool,

    /// Steps in the script
    pub expected_events: usize,

    /// Emitted events, oldest first
    pub events: Vec<Event>,

    /// Virtual time of each emission, parallel to `events`
    pub emitted_at: Vec<Duration>,

    /// Virtual time when the run ended
    pub final_time: Duration,

    /// Final session metadata
    pub session: Option<Session>,

    /// Counters from the display stores
    pub stats: EventStats,

    /// Agents still on screen at the end
    pub final_agent_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,
}

impl ScenarioResult {
    pub fn final_time_ms(&self) -> u64 {
        self.final_time.as_millis() as u64
    }
}

#[derive(Debug, Clone, Copy)]
struct PausePlan {
    /// Pause once this many events have been emitted
    after: usize,
    hold: Duration,
}

/// Runs scenarios against the player.
pub struct ScenarioRunner {
    /// Seed for ids and randomized scripts
    seed: u64,

    /// Speed multiplier
    speed: f64,

    /// Spacing between catalog steps
    cadence_ms: u64,

    pause: Option<PausePlan>,

    config: RelayConfig,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            speed: 1.0,
            cadence_ms: DEFAULT_CADENCE_MS,
            pause: None,
            config: RelayConfig::default(),
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_cadence(mut self, cadence_ms: u64) -> Self {
        self.cadence_ms = cadence_ms;
        self
    }

    /// Pauses after `after` emissions for `hold_ms` of virtual time.
    pub fn with_pause(mut self, after: usize, hold_ms: u64) -> Self {
        self.pause = Some(PausePlan {
            after,
            hold: Duration::from_millis(hold_ms),
        });
        self
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Builds the script the runner would play.
    pub fn script(&self, scenario: ScenarioId) -> Scenario {
        scenario.build(self.seed, self.cadence_ms)
    }

    /// Replays a scenario and returns the checked result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={}, speed={}x)", scenario.name(), self.seed, self.speed);

        let script = self.script(scenario);
        let ctx = SimContext::shared(self.seed);
        let mut player = Player::new(Arc::clone(&ctx), self.config.player.clone());
        let mut hub = StoreHub::new(self.config.stores.clone());
        let mut rx = player.subscribe();

        let mut events = Vec::with_capacity(script.len());
        let mut emitted_at = Vec::with_capacity(script.len());
        let mut failures = Vec::new();
        let mut resumed_at = None;

        player.start(Some(script.clone()), Some(self.speed));

        // Each iteration fires at least one emission or ends the run
        for _ in 0..=script.len() * 2 + 1 {
            player.poll();
            let now = ctx.now();

            loop {
                match rx.try_recv() {
                    Ok(event) => {
                        hub.handle(&event, now);
                        events.push(event);
                        emitted_at.push(now);
                    }
                    Err(TryRecvError::Lagged(n)) => {
                        failures.push(format!("subscriber lagged by {} events", n));
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
            hub.tick(now);

            if let Some(plan) = self.pause {
                if resumed_at.is_none() && player.cursor() >= plan.after && player.has_pending() {
                    player.pause();
                    debug!("holding at event {} for {:?}", player.cursor(), plan.hold);
                    ctx.advance_time(plan.hold);
                    hub.tick(ctx.now());
                    player.resume();
                    resumed_at = Some((player.cursor(), ctx.now()));
                }
            }

            match player.next_deadline() {
                Some(deadline) => ctx.advance_to(deadline),
                None => break,
            }
        }

        // Let deferred spawn/release transitions settle
        while let Some(due) = hub.next_transition() {
            ctx.advance_to(due);
            hub.tick(ctx.now());
        }

        failures.extend(check_playback(
            &script,
            self.speed,
            &events,
            &emitted_at,
            resumed_at,
            player.state(),
        ));

        let session = player.session();
        match &session {
            Some(session) => {
                if session.stats.event_count != events.len() as u64 {
                    failures.push(format!(
                        "session counted {} events, {} emitted",
                        session.stats.event_count,
                        events.len()
                    ));
                }
                let io_expected: u64 = events.iter().map(|e| e.payload.io_bytes()).sum();
                if session.stats.io_bytes != io_expected {
                    failures.push(format!(
                        "session counted {} I/O bytes, expected {}",
                        session.stats.io_bytes, io_expected
                    ));
                }
            }
            None => failures.push("no session published".to_string()),
        }

        if hub.stats().total_events != events.len() as u64 {
            failures.push("display stores missed events".to_string());
        }

        let passed = failures.is_empty();
        if !passed {
            warn!("{}: {}", scenario.name(), failures.join("; "));
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            speed: self.speed,
            passed,
            expected_events: script.len(),
            events,
            emitted_at,
            final_time: ctx.now(),
            session,
            stats: hub.stats(),
            final_agent_count: hub.agents().len(),
            failure_reason: if passed { None } else { Some(failures.join("; ")) },
        }
    }
}

/// Checks order, uniqueness and relative timing of one playback.
fn check_playback(
    script: &Scenario,
    speed: f64,
    events: &[Event],
    emitted_at: &[Duration],
    resumed_at: Option<(usize, Duration)>,
    state: PlayerState,
) -> Vec<String> {
    let mut failures = Vec::new();

    if events.len() != script.len() {
        failures.push(format!(
            "playback stalled at event {} of {}",
            events.len(),
            script.len()
        ));
    }
    if state != PlayerState::Done {
        failures.push(format!("player ended in state {}", state));
    }

    for (i, (event, step)) in events.iter().zip(&script.steps).enumerate() {
        if event.payload != step.payload || event.source != step.source {
            failures.push(format!("event {} out of order ({})", i, event.payload.tag()));
            break;
        }
    }

    let unique: HashSet<_> = events.iter().map(|e| e.id).collect();
    if unique.len() != events.len() {
        failures.push("duplicate event ids".to_string());
    }

    let mut expected = Duration::ZERO;
    for (i, at) in emitted_at.iter().enumerate() {
        let base = match resumed_at {
            Some((cursor, resumed)) if cursor == i => resumed,
            _ => expected,
        };
        let Some(delay) = scaled_delay(script.gap_ms(i), speed) else {
            break;
        };
        expected = base + delay;
        if *at != expected {
            failures.push(format!(
                "event {} fired at {:?}, expected {:?}",
                i, at, expected
            ));
            break;
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_scenarios_pass() {
        let runner = ScenarioRunner::new(42);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
            assert_eq!(result.events.len(), result.expected_events);
        }
    }

    #[test]
    fn test_relay_demo_timing() {
        let result = ScenarioRunner::new(1).run(ScenarioId::RelayDemo);
        assert!(result.passed);
        assert_eq!(result.final_time_ms(), 680);
        assert_eq!(result.session.map(|s| s.stats.io_bytes), Some(43));
    }

    #[test]
    fn test_double_speed_halves_duration() {
        let result = ScenarioRunner::new(1).with_speed(2.0).run(ScenarioId::RelayDemo);
        assert!(result.passed);
        assert_eq!(result.final_time_ms(), 340);
    }

    #[test]
    fn test_pause_shifts_remaining_events() {
        let result = ScenarioRunner::new(1)
            .with_pause(3, 1000)
            .run(ScenarioId::RelayDemo);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.events.len(), 8);

        // Event 3 waits for its full gap after the resume
        let gap = result.emitted_at[3] - result.emitted_at[2];
        assert_eq!(gap, Duration::from_millis(1000 + 80));
    }

    #[test]
    fn test_zero_speed_stalls() {
        let result = ScenarioRunner::new(1).with_speed(0.0).run(ScenarioId::RelayDemo);
        assert!(!result.passed);
        assert!(result.events.is_empty());
        assert!(result
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.contains("stalled")));
    }

    #[test]
    fn test_spawned_agents_settle() {
        let result = ScenarioRunner::new(7).run(ScenarioId::SpawnSequence);
        assert!(result.passed);
        assert!(result.stats.agent_spawns > 0);
        assert_eq!(result.final_agent_count as u64, result.stats.agent_spawns);
    }

    #[test]
    fn test_same_seed_same_ids() {
        let a = ScenarioRunner::new(9).run(ScenarioId::MessageFlurry);
        let b = ScenarioRunner::new(9).run(ScenarioId::MessageFlurry);
        let ids_a: Vec<_> = a.events.iter().map(|e| e.id).collect();
        let ids_b: Vec<_> = b.events.iter().map(|e| e.id).collect();
        assert_eq!(ids_a, ids_b);
    }
}
