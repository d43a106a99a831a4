//! Scenario Player - deterministic, speed-adjustable replay.
//!
//! The player turns a [`Scenario`] into a stream of [`Event`]s. It is
//! Sans-IO: time is read from its [`RelayContext`], and whoever drives it
//! calls [`Player::poll`] once [`Player::next_deadline`] has passed (a virtual
//! clock in tests and simulation, Tokio timers in [`crate::driver`]).
//!
//! # Scheduling
//!
//! ```text
//! delay(i) = max(0, at[i] - at[i-1]) / speed      (at[-1] = 0)
//!
//!  start ──► [gap 0] ──► emit 0 ──► [gap 1] ──► emit 1 ──► ... ──► done
//!                 ▲                     ▲
//!                 │                     └─ speed read here, when emit 0 fires
//!                 └─ speed read at start/resume
//! ```
//!
//! At most one emission is pending at any time. Every control operation
//! cancels it before doing anything else, so emission chains never overlap.

use chrono::{DateTime, Utc};
use relay_env::RelayContext;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::config::PlayerConfig;
use crate::event::Event;
use crate::history::History;
use crate::scenario::{Scenario, Session};

/// Playback state, owned by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Idle,
    Running,
    Paused,
    Done,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlayerState::Idle => "idle",
            PlayerState::Running => "running",
            PlayerState::Paused => "paused",
            PlayerState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Shared speed multiplier.
///
/// Cloning shares the value. Reads happen at every scheduling decision, so a
/// change takes effect on the next gap scheduled, never on one in flight.
#[derive(Debug, Clone)]
pub struct SpeedControl(Arc<AtomicU64>);

impl SpeedControl {
    pub fn new(speed: f64) -> Self {
        Self(Arc::new(AtomicU64::new(speed.to_bits())))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, speed: f64) {
        self.0.store(speed.to_bits(), Ordering::Relaxed);
    }
}

/// Scales a scenario gap by the speed multiplier.
///
/// Returns `None` ("never elapses") for zero, negative or NaN speeds and for
/// delays too large to represent.
pub fn scaled_delay(gap_ms: u64, speed: f64) -> Option<Duration> {
    if speed.is_nan() || speed <= 0.0 {
        return None;
    }
    let nanos = (gap_ms as f64 * 1_000_000.0 / speed).round();
    if nanos >= u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos as u64))
}

/// The one pending emission. `due: None` never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    due: Option<Duration>,
}

/// Replays one scenario at a time.
pub struct Player<C: RelayContext> {
    ctx: Arc<C>,
    speed: SpeedControl,
    scenario: Scenario,
    /// Index of the next step to emit
    cursor: usize,
    pending: Option<Pending>,
    session_id: String,
    timeline: History<Event>,
    events_tx: broadcast::Sender<Event>,
    state_tx: watch::Sender<PlayerState>,
    session_tx: watch::Sender<Option<Session>>,
}

impl<C: RelayContext> Player<C> {
    /// Creates an idle player loaded with the built-in default scenario.
    pub fn new(ctx: Arc<C>, config: PlayerConfig) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (state_tx, _) = watch::channel(PlayerState::Idle);
        let (session_tx, _) = watch::channel(None);

        Self {
            ctx,
            speed: SpeedControl::new(config.default_speed),
            scenario: Scenario::relay_demo(),
            cursor: 0,
            pending: None,
            session_id: String::new(),
            timeline: History::new(config.history_cap),
            events_tx,
            state_tx,
            session_tx,
        }
    }

    // -------------------------------------------------------------------------
    // Control
    // -------------------------------------------------------------------------

    /// Stops any playback and replays `scenario` (the default when `None`)
    /// from the beginning.
    ///
    /// Clears the timeline and publishes fresh session metadata.
    pub fn start(&mut self, scenario: Option<Scenario>, speed: Option<f64>) {
        self.stop();

        if let Some(speed) = speed {
            self.speed.set(speed);
        }
        self.scenario = scenario.unwrap_or_else(Scenario::relay_demo);
        self.timeline.clear();

        self.open_session();

        info!(
            "Starting scenario: {} ({} events, speed={}x)",
            self.scenario.name,
            self.scenario.len(),
            self.speed.get()
        );

        self.set_state(PlayerState::Running);
        let now = self.ctx.now();
        self.schedule_next(now);
    }

    /// Cancels any pending emission and rewinds. Idempotent.
    pub fn stop(&mut self) {
        if self.pending.take().is_some() {
            debug!("Stopped {} at event {}", self.scenario.name, self.cursor);
        }
        self.cursor = 0;
        self.set_state(PlayerState::Idle);
    }

    /// Cancels the pending emission, keeping the cursor.
    ///
    /// No-op unless an emission is pending.
    pub fn pause(&mut self) {
        if self.pending.take().is_none() {
            return;
        }
        debug!("Paused {} at event {}", self.scenario.name, self.cursor);
        self.set_state(PlayerState::Paused);
    }

    /// Continues from the cursor with a freshly scheduled gap.
    ///
    /// No-op when running, when an emission is pending, or when every event
    /// has already been emitted.
    pub fn resume(&mut self) {
        if self.pending.is_some()
            || self.state() == PlayerState::Running
            || self.cursor >= self.scenario.len()
        {
            return;
        }
        debug!("Resuming {} at event {}", self.scenario.name, self.cursor);
        // Resuming a player that was never started plays its loaded scenario
        let unopened = self.session_tx.borrow().is_none();
        if unopened {
            self.open_session();
        }
        self.set_state(PlayerState::Running);
        let now = self.ctx.now();
        self.schedule_next(now);
    }

    /// Emits every event whose deadline has passed; returns how many.
    ///
    /// Each follow-up gap is measured from the deadline that just fired, so
    /// late polling does not stretch the replay.
    pub fn poll(&mut self) -> usize {
        let now = self.ctx.now();
        let mut emitted = 0;

        while let Some(Pending { due: Some(due) }) = self.pending {
            if due > now {
                break;
            }
            self.pending = None;
            self.emit_current();
            self.cursor += 1;
            emitted += 1;
            self.schedule_next(due);
        }

        emitted
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// When the pending emission is due, on the context's monotonic clock.
    ///
    /// `None` when nothing is pending or the pending gap never elapses.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.and_then(|p| p.due)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn state(&self) -> PlayerState {
        *self.state_tx.borrow()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn speed(&self) -> SpeedControl {
        self.speed.clone()
    }

    /// Emitted events, newest first.
    pub fn timeline(&self) -> &History<Event> {
        &self.timeline
    }

    pub fn latest(&self) -> Option<&Event> {
        self.timeline.latest()
    }

    pub fn session(&self) -> Option<Session> {
        self.session_tx.borrow().clone()
    }

    /// Subscribes to emitted events (only those emitted after subscribing).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<PlayerState> {
        self.state_tx.subscribe()
    }

    pub fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.session_tx.subscribe()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn schedule_next(&mut self, from: Duration) {
        if self.cursor >= self.scenario.len() {
            self.pending = None;
            info!("Scenario {} done ({} events)", self.scenario.name, self.cursor);
            self.set_state(PlayerState::Done);
            return;
        }

        let gap_ms = self.scenario.gap_ms(self.cursor);
        let due = scaled_delay(gap_ms, self.speed.get()).and_then(|delay| from.checked_add(delay));
        self.pending = Some(Pending { due });
    }

    fn open_session(&mut self) {
        self.session_id = format!("sim-{}", self.ctx.new_id().short());
        let session = Session::open(self.session_id.clone(), self.wall_clock(), &self.scenario.session);
        self.session_tx.send_replace(Some(session));
    }

    fn emit_current(&mut self) {
        let step = &self.scenario.steps[self.cursor];
        let ts = self.wall_clock();

        let event = Event {
            id: self.ctx.new_id(),
            ts,
            session_id: self.session_id.clone(),
            source: step.source.clone(),
            target: step.target.clone(),
            channel: step.resolved_channel(),
            thread: step.thread.clone(),
            payload: step.payload.clone(),
        };

        debug!(
            "emit #{} {}/{} {} -> {}",
            self.cursor,
            event.kind(),
            event.subtype(),
            event.source,
            event.target.as_deref().unwrap_or("*")
        );

        self.timeline.push(event.clone());
        self.session_tx.send_modify(|session| {
            if let Some(session) = session {
                session.stats.record(&event.payload);
                session.last_event_at = Some(ts);
            }
        });
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn set_state(&self, next: PlayerState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.ctx.system_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, HealthStatus};
    use crate::scenario::{ScenarioStep, SessionTemplate};
    use crate::testing::ManualContext;

    fn status(at: u64, component: &str) -> ScenarioStep {
        ScenarioStep::new(
            at,
            "daemon",
            EventPayload::DaemonStatus {
                component: component.into(),
                status: HealthStatus::Ok,
                detail: None,
            },
        )
    }

    fn scripted(offsets: &[u64]) -> Scenario {
        Scenario {
            name: "scripted".into(),
            session: SessionTemplate {
                command: "test".into(),
                tags: vec![],
                agents: vec![],
            },
            steps: offsets
                .iter()
                .enumerate()
                .map(|(i, at)| status(*at, &format!("c{}", i)))
                .collect(),
        }
    }

    fn component(event: &Event) -> String {
        match &event.payload {
            EventPayload::DaemonStatus { component, .. } => component.clone(),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    /// Components in emission order (timeline is newest first).
    fn emitted(player: &Player<ManualContext>) -> Vec<String> {
        player.timeline().iter().rev().map(component).collect()
    }

    fn player() -> (Arc<ManualContext>, Player<ManualContext>) {
        let ctx = ManualContext::shared();
        let player = Player::new(ctx.clone(), PlayerConfig::default());
        (ctx, player)
    }

    #[test]
    fn test_scaled_delay() {
        assert_eq!(scaled_delay(100, 1.0), Some(Duration::from_millis(100)));
        assert_eq!(scaled_delay(100, 2.0), Some(Duration::from_millis(50)));
        assert_eq!(scaled_delay(0, 3.0), Some(Duration::ZERO));
        assert_eq!(scaled_delay(100, 0.0), None);
        assert_eq!(scaled_delay(100, -1.0), None);
        assert_eq!(scaled_delay(100, f64::NAN), None);
        assert_eq!(scaled_delay(u64::MAX, 1e-300), None);
    }

    #[test]
    fn test_example_timing_at_speed_one() {
        let (ctx, mut player) = player();
        player.start(Some(scripted(&[0, 100, 100])), Some(1.0));

        // A is due immediately
        assert_eq!(player.next_deadline(), Some(Duration::ZERO));
        assert_eq!(player.poll(), 1);
        assert_eq!(emitted(&player), vec!["c0"]);

        // B at +100ms
        ctx.advance_ms(99);
        assert_eq!(player.poll(), 0);
        ctx.advance_ms(1);
        // B and then C (+0ms after B) in the same poll
        assert_eq!(player.poll(), 2);
        assert_eq!(emitted(&player), vec!["c0", "c1", "c2"]);
        assert_eq!(player.state(), PlayerState::Done);
        assert!(!player.has_pending());
    }

    #[test]
    fn test_speed_two_halves_every_delay() {
        let (ctx, mut player) = player();
        player.start(Some(scripted(&[0, 100, 300])), Some(2.0));

        assert_eq!(player.poll(), 1);
        assert_eq!(player.next_deadline(), Some(Duration::from_millis(50)));
        ctx.advance_ms(50);
        assert_eq!(player.poll(), 1);
        assert_eq!(player.next_deadline(), Some(Duration::from_millis(150)));
        ctx.advance_ms(100);
        assert_eq!(player.poll(), 1);
        assert_eq!(player.state(), PlayerState::Done);
    }

    #[test]
    fn test_full_replay_emits_each_event_once_in_order() {
        let (ctx, mut player) = player();
        let scenario = Scenario::relay_demo();
        let total = scenario.total_ms();
        player.start(Some(scenario.clone()), None);

        ctx.advance_ms(total);
        assert_eq!(player.poll(), scenario.len());

        let tags: Vec<_> = player.timeline().iter().rev().map(|e| e.payload.tag()).collect();
        let expected: Vec<_> = scenario.steps.iter().map(|s| s.payload.tag()).collect();
        assert_eq!(tags, expected);
        assert_eq!(player.state(), PlayerState::Done);
    }

    #[test]
    fn test_speed_change_applies_to_next_gap_only() {
        let (ctx, mut player) = player();
        let speed = player.speed();
        player.start(Some(scripted(&[0, 100, 200])), Some(1.0));
        player.poll();

        // Gap to c1 already scheduled at 100ms
        speed.set(4.0);
        assert_eq!(player.next_deadline(), Some(Duration::from_millis(100)));
        ctx.advance_ms(100);
        assert_eq!(player.poll(), 1);

        // Gap to c2 picks up the new speed
        assert_eq!(player.next_deadline(), Some(Duration::from_millis(125)));
    }

    #[test]
    fn test_stop_resets_and_restart_is_deterministic() {
        let (ctx, mut player) = player();
        player.start(Some(scripted(&[0, 100, 200])), None);
        ctx.advance_ms(100);
        player.poll();
        assert_eq!(player.cursor(), 2);

        player.stop();
        assert_eq!(player.state(), PlayerState::Idle);
        assert_eq!(player.cursor(), 0);
        assert!(!player.has_pending());

        // Idempotent
        player.stop();
        assert_eq!(player.state(), PlayerState::Idle);

        player.start(Some(scripted(&[0, 100, 200])), None);
        assert_eq!(player.timeline().len(), 0);
        ctx.advance_ms(200);
        player.poll();
        assert_eq!(emitted(&player), vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn test_pause_resume_no_duplicates_no_drops() {
        let (ctx, mut player) = player();
        player.start(Some(scripted(&[0, 100, 200, 300])), None);
        ctx.advance_ms(100);
        player.poll();
        assert_eq!(player.cursor(), 2);

        player.pause();
        assert_eq!(player.state(), PlayerState::Paused);
        assert_eq!(player.next_deadline(), None);

        // A long pause emits nothing
        ctx.advance_ms(60_000);
        assert_eq!(player.poll(), 0);

        player.resume();
        assert_eq!(player.state(), PlayerState::Running);
        // The interrupted gap restarts from the resume point
        assert_eq!(player.next_deadline(), Some(Duration::from_millis(60_200)));

        ctx.advance_ms(200);
        assert_eq!(player.poll(), 2);
        assert_eq!(emitted(&player), vec!["c0", "c1", "c2", "c3"]);
        assert_eq!(player.state(), PlayerState::Done);
    }

    #[test]
    fn test_pause_and_resume_no_ops() {
        let (_ctx, mut player) = player();

        // Nothing scheduled yet
        player.pause();
        assert_eq!(player.state(), PlayerState::Idle);

        player.start(Some(scripted(&[0])), None);
        player.poll();
        assert_eq!(player.state(), PlayerState::Done);

        // Past the end
        player.resume();
        assert_eq!(player.state(), PlayerState::Done);
        player.pause();
        assert_eq!(player.state(), PlayerState::Done);
    }

    #[test]
    fn test_resume_before_start_opens_session() {
        let (ctx, mut player) = player();
        assert!(player.session().is_none());

        player.resume();
        assert_eq!(player.state(), PlayerState::Running);
        let session = player.session().expect("session published on resume");
        assert!(session.id.starts_with("sim-"));
        assert_eq!(session.command, "relay-pty demo");

        ctx.advance_ms(1000);
        assert_eq!(player.poll(), 8);
        let session = player.session().unwrap();
        assert_eq!(session.stats.event_count, 8);
        assert_eq!(session.stats.io_bytes, 43);
        assert!(player.timeline().iter().all(|e| e.session_id == session.id));
    }

    #[test]
    fn test_resume_after_pause_keeps_session() {
        let (ctx, mut player) = player();
        player.start(Some(scripted(&[0, 100])), None);
        player.poll();
        let id = player.session().unwrap().id;

        player.pause();
        player.resume();
        ctx.advance_ms(100);
        player.poll();
        let session = player.session().unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.stats.event_count, 2);
    }

    #[test]
    fn test_resume_while_running_is_noop() {
        let (_ctx, mut player) = player();
        player.start(Some(scripted(&[0, 100])), None);
        let deadline = player.next_deadline();
        player.resume();
        assert_eq!(player.next_deadline(), deadline);
    }

    #[test]
    fn test_zero_speed_is_effectively_paused() {
        let (ctx, mut player) = player();
        player.start(Some(scripted(&[0, 100])), Some(0.0));

        assert_eq!(player.state(), PlayerState::Running);
        assert!(player.has_pending());
        assert_eq!(player.next_deadline(), None);

        ctx.advance_ms(1_000_000);
        assert_eq!(player.poll(), 0);

        // Pause/resume reschedules under the new speed
        player.speed().set(1.0);
        player.pause();
        player.resume();
        ctx.advance_ms(100);
        assert_eq!(player.poll(), 2);
    }

    #[test]
    fn test_history_cap_evicts_oldest() {
        let ctx = ManualContext::shared();
        let config = PlayerConfig {
            history_cap: 3,
            ..PlayerConfig::default()
        };
        let mut player = Player::new(ctx.clone(), config);
        player.start(Some(scripted(&[0, 0, 0, 0, 0])), None);
        player.poll();

        assert_eq!(player.timeline().len(), 3);
        assert_eq!(emitted(&player), vec!["c2", "c3", "c4"]);
        assert_eq!(player.latest().map(component).as_deref(), Some("c4"));
    }

    #[test]
    fn test_session_stats_track_emissions() {
        let (ctx, mut player) = player();
        player.start(None, None);

        let session = player.session().expect("session published on start");
        assert_eq!(session.command, "relay-pty demo");
        assert_eq!(session.stats.event_count, 0);
        assert!(session.last_event_at.is_none());

        // Through the second pty/io event (at 320ms)
        ctx.advance_ms(320);
        player.poll();
        let session = player.session().unwrap();
        assert_eq!(session.stats.event_count, 5);
        assert_eq!(session.stats.io_bytes, 16 + 27);
        assert_eq!(session.last_event_at, player.latest().map(|e| e.ts));

        ctx.advance_ms(1000);
        player.poll();
        let session = player.session().unwrap();
        assert_eq!(session.stats.event_count, 8);
        assert_eq!(session.stats.io_bytes, 43);
    }

    #[test]
    fn test_events_carry_fresh_ids_and_session() {
        let (ctx, mut player) = player();
        player.start(None, None);
        ctx.advance_ms(1000);
        player.poll();

        let session_id = player.session().unwrap().id;
        let mut ids: Vec<_> = player.timeline().iter().map(|e| e.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert!(player.timeline().iter().all(|e| e.session_id == session_id));

        // Channel resolved from the agent message payload
        let chat = player.timeline().iter().find(|e| e.payload.tag() == "agent/msg").unwrap();
        assert_eq!(chat.channel.as_deref(), Some("#general"));
    }

    #[test]
    fn test_subscribers_receive_events_in_order() {
        let (ctx, mut player) = player();
        let mut rx = player.subscribe();
        let state_rx = player.watch_state();

        player.start(Some(scripted(&[0, 10, 20])), None);
        assert_eq!(*state_rx.borrow(), PlayerState::Running);
        ctx.advance_ms(20);
        player.poll();

        let received: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| component(&e))
            .collect();
        assert_eq!(received, vec!["c0", "c1", "c2"]);
        assert_eq!(*state_rx.borrow(), PlayerState::Done);
    }

    #[test]
    fn test_empty_scenario_is_done_immediately() {
        let (_ctx, mut player) = player();
        player.start(Some(scripted(&[])), None);
        assert_eq!(player.state(), PlayerState::Done);
        assert_eq!(player.poll(), 0);
    }

    #[test]
    fn test_start_restarts_running_playback() {
        let (ctx, mut player) = player();
        player.start(Some(scripted(&[0, 100])), None);
        player.poll();
        assert_eq!(player.timeline().len(), 1);

        player.start(Some(scripted(&[50])), None);
        assert_eq!(player.timeline().len(), 0);
        assert_eq!(player.cursor(), 0);
        ctx.advance_ms(50);
        assert_eq!(player.poll(), 1);
        assert_eq!(player.state(), PlayerState::Done);
    }
}
