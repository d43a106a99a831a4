//! Endless simulated event stream.
//!
//! Cycles through the catalog story (everything except the default scenario)
//! forever, stamping each step with a fresh id and wall-clock time. Used to
//! keep a live view busy without a relay behind it.

use chrono::{DateTime, Utc};
use relay_env::RelayContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::{ScenarioId, DEFAULT_CADENCE_MS};
use crate::event::Event;
use crate::scenario::Scenario;

pub struct ScenarioCycle<C: RelayContext> {
    ctx: Arc<C>,
    seed: u64,
    order: Vec<ScenarioId>,
    /// Index into `order` of the scenario being materialized
    position: usize,
    /// Completed passes over `order`
    round: u64,
    current: Scenario,
    step: usize,
    session_id: String,
}

impl<C: RelayContext> ScenarioCycle<C> {
    pub fn new(ctx: Arc<C>, seed: u64) -> Self {
        let order = ScenarioId::story();
        let current = order
            .first()
            .map(|id| id.build(seed, DEFAULT_CADENCE_MS))
            .unwrap_or_default();
        let session_id = format!("stream-{}", ctx.new_id().short());

        Self {
            ctx,
            seed,
            order,
            position: 0,
            round: 0,
            current,
            step: 0,
            session_id,
        }
    }

    /// Name of the scenario the next event comes from.
    pub fn current_scenario(&self) -> &str {
        &self.current.name
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    fn advance_scenario(&mut self) {
        self.position += 1;
        if self.position >= self.order.len() {
            self.position = 0;
            self.round += 1;
        }
        // Each pass reseeds so randomized scripts vary between rounds
        let seed = self.seed.wrapping_add(self.round);
        self.current = self.order[self.position].build(seed, DEFAULT_CADENCE_MS);
        self.step = 0;
        debug!(scenario = %self.current.name, round = self.round, "stream scenario");
    }
}

impl<C: RelayContext> Iterator for ScenarioCycle<C> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        // Bounded so a catalog of empty scripts cannot spin forever
        for _ in 0..=self.order.len() {
            if let Some(step) = self.current.steps.get(self.step) {
                self.step += 1;
                return Some(Event {
                    id: self.ctx.new_id(),
                    ts: DateTime::<Utc>::from(self.ctx.system_time()),
                    session_id: self.session_id.clone(),
                    source: step.source.clone(),
                    target: step.target.clone(),
                    channel: step.resolved_channel(),
                    thread: step.thread.clone(),
                    payload: step.payload.clone(),
                });
            }
            if self.order.is_empty() {
                return None;
            }
            self.advance_scenario();
        }
        None
    }
}

/// Sends one event every `1000 / events_per_sec` ms until the events run out
/// or the receiver goes away. Returns the number delivered.
pub async fn pump_events<C, I>(
    ctx: Arc<C>,
    events: I,
    events_per_sec: f64,
    tx: mpsc::Sender<Event>,
) -> usize
where
    C: RelayContext,
    I: IntoIterator<Item = Event>,
{
    let interval = match Duration::try_from_secs_f64(1.0 / events_per_sec) {
        Ok(interval) if events_per_sec > 0.0 => interval,
        _ => {
            warn!(events_per_sec, "event rate must be positive, not streaming");
            return 0;
        }
    };
    info!("Streaming simulated events every {:?}", interval);

    let mut sent = 0;
    for event in events {
        ctx.sleep(interval).await;
        if tx.send(event).await.is_err() {
            debug!("stream receiver closed after {} events", sent);
            break;
        }
        sent += 1;
    }
    sent
}
