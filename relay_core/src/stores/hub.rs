//! Routes emitted events into the display stores.

use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::agents::{circle_point, Agent, AgentRole, AgentStatus, AgentStore};
use super::messages::{DeliveryStatus, Message, MessageStore};
use crate::config::StoreConfig;
use crate::event::{Event, EventPayload, HealthStatus};

/// Where freshly spawned agents land before any layout pass.
const SPAWN_CENTER: (f64, f64) = (400.0, 300.0);
const SPAWN_RADIUS: f64 = 200.0;
const SPAWN_SLOTS: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub total_events: u64,
    pub agent_spawns: u64,
    pub agent_releases: u64,
    pub messages_sent: u64,
    /// Daemon reports with an error status
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaemonState {
    pub component: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Default for DaemonState {
    fn default() -> Self {
        Self {
            component: "daemon".to_string(),
            status: HealthStatus::Ok,
            detail: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Transition {
    Activate(String),
    Remove(String),
}

#[derive(Debug, Clone)]
struct Deferred {
    due: Duration,
    transition: Transition,
}

/// Owns the agent and message stores and applies events to them.
///
/// Time only moves through the `now` arguments, so a virtual clock drives it
/// as well as a real one.
#[derive(Debug, Clone)]
pub struct StoreHub {
    config: StoreConfig,
    agents: AgentStore,
    messages: MessageStore,
    daemon: DaemonState,
    stats: EventStats,
    deferred: Vec<Deferred>,
    next_slot: usize,
}

impl StoreHub {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            agents: AgentStore::new(),
            messages: MessageStore::new(config.clone()),
            daemon: DaemonState::default(),
            stats: EventStats::default(),
            deferred: Vec::new(),
            next_slot: 0,
            config,
        }
    }

    pub fn handle(&mut self, event: &Event, now: Duration) {
        self.stats.total_events += 1;

        match &event.payload {
            EventPayload::AgentSpawn {
                name,
                role,
                spawned_by,
            } => {
                let fraction = (self.next_slot % SPAWN_SLOTS) as f64 / SPAWN_SLOTS as f64;
                self.next_slot += 1;
                let (x, y) = circle_point(fraction, SPAWN_CENTER.0, SPAWN_CENTER.1, SPAWN_RADIUS);

                self.agents.spawn(Agent {
                    id: event.source.clone(),
                    name: name.clone().unwrap_or_else(|| event.source.clone()),
                    role: AgentRole::parse(role.as_deref().unwrap_or("worker")),
                    status: AgentStatus::Spawning,
                    x,
                    y,
                    spawned_at: now,
                    spawned_by: spawned_by.clone(),
                });
                self.stats.agent_spawns += 1;
                self.defer(
                    now + Duration::from_millis(self.config.spawn_settle_ms),
                    Transition::Activate(event.source.clone()),
                );
            }
            EventPayload::AgentRelease { .. } => {
                self.agents.update_status(&event.source, AgentStatus::Releasing);
                self.stats.agent_releases += 1;
                self.defer(
                    now + Duration::from_millis(self.config.release_linger_ms),
                    Transition::Remove(event.source.clone()),
                );
            }
            EventPayload::AgentState { status } => {
                self.agents.update_status(&event.source, AgentStatus::parse(status));
            }
            EventPayload::AgentMsg { thread, .. } => {
                // Broadcasts and channel chatter without a recipient have no edge to draw
                if let Some(target) = &event.target {
                    self.messages.send(
                        Message {
                            id: event.id,
                            from: event.source.clone(),
                            to: target.clone(),
                            content: event.payload.message_text().unwrap_or_default().to_string(),
                            channel: event
                                .channel
                                .clone()
                                .or_else(|| event.payload.channel().map(str::to_string)),
                            thread: event.thread.clone().or_else(|| thread.clone()),
                            timestamp: now,
                            status: DeliveryStatus::Sending,
                        },
                        now,
                    );
                    self.stats.messages_sent += 1;
                }
            }
            EventPayload::DaemonStatus {
                component,
                status,
                detail,
            } => {
                if *status == HealthStatus::Error {
                    self.stats.errors += 1;
                }
                self.daemon = DaemonState {
                    component: component.clone(),
                    status: *status,
                    detail: detail.clone(),
                };
            }
            EventPayload::PtyOpen { .. } | EventPayload::PtyIo { .. } => {
                self.agents.update_status(&event.source, AgentStatus::Busy);
            }
            EventPayload::PtyExit { .. } => {
                self.agents.update_status(&event.source, AgentStatus::Idle);
            }
            EventPayload::RelaySpawn { .. }
            | EventPayload::RelayRelease { .. }
            | EventPayload::SystemState { .. } => {
                debug!(kind = %event.payload.tag(), source = %event.source, "no store for event");
            }
        }
    }

    /// Applies deferred transitions that are due and expires message
    /// animations.
    pub fn tick(&mut self, now: Duration) {
        let (due, pending): (Vec<_>, Vec<_>) =
            self.deferred.drain(..).partition(|d| d.due <= now);
        self.deferred = pending;

        for deferred in due {
            match deferred.transition {
                Transition::Activate(id) => {
                    // A release that arrived during the settle wins
                    if self.agents.get(&id).map(|a| a.status) == Some(AgentStatus::Spawning) {
                        self.agents.update_status(&id, AgentStatus::Active);
                    }
                }
                Transition::Remove(id) => {
                    self.agents.release(&id);
                }
            }
        }

        self.messages.tick(now);
        self.messages.deactivate_stale(now);
    }

    /// Earliest pending deferred transition.
    pub fn next_transition(&self) -> Option<Duration> {
        self.deferred.iter().map(|d| d.due).min()
    }

    pub fn reset(&mut self) {
        self.agents.clear();
        self.messages.clear();
        self.daemon = DaemonState::default();
        self.stats = EventStats::default();
        self.deferred.clear();
        self.next_slot = 0;
    }

    fn defer(&mut self, due: Duration, transition: Transition) {
        // Deferred entries are applied in arrival order within a tick
        self.deferred.push(Deferred { due, transition });
    }

    pub fn agents(&self) -> &AgentStore {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut AgentStore {
        &mut self.agents
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageStore {
        &mut self.messages
    }

    pub fn daemon(&self) -> &DaemonState {
        &self.daemon
    }

    pub fn stats(&self) -> EventStats {
        self.stats
    }
}

impl Default for StoreHub {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
