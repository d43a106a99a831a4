//! Relay Core - Deterministic Scenario Playback for Relay Visualizations
//!
//! This library turns scripted agent-relay activity into a live event feed:
//! 1. **Event model**: a closed set of tagged payloads (`pty/*`, `agent/*`,
//!    `daemon/*`, `relay/*`, `system/*`) with a kind derived from the tag
//! 2. **Scenario player**: a Sans-IO state machine (idle, running, paused,
//!    done) that replays offsets at a live-adjustable speed, with a capped
//!    timeline and session metadata
//! 3. **Display stores**: agent and message projections a renderer draws from
//!
//! Around the core sit the canned scenario catalog, an endless simulated
//! stream, the JSONL timeline log parser and the pipeline dashboard feed.

pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod history;
pub mod log;
pub mod pipeline;
pub mod player;
pub mod scenario;
pub mod stores;
pub mod stream;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use catalog::ScenarioId;
pub use config::{PipelineConfig, PlayerConfig, RelayConfig, StoreConfig};
pub use driver::PlayerHandle;
pub use error::{RelayError, Result};
pub use event::{classify_tag, Event, EventKind, EventPayload};
pub use history::History;
pub use player::{Player, PlayerState, SpeedControl};
pub use scenario::{Scenario, ScenarioStep, Session, SessionStats};
pub use stores::StoreHub;
pub use stream::{pump_events, ScenarioCycle};
