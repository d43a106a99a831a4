//! Relay Deterministic Simulation Harness
//!
//! Replays the scenario catalog against the player on a virtual clock and
//! checks what came out.
//!
//! # Core Principle
//!
//! Nothing in a run depends on the machine it runs on:
//! - **Time**: the clock jumps straight to the player's next deadline
//! - **Identity**: event ids come from a ChaCha8 stream seeded per run
//! - **Scripts**: randomized scenarios draw from the same seed
//!
//! # Usage
//!
//! ```ignore
//! use relay_sim::ScenarioRunner;
//! use relay_core::ScenarioId;
//!
//! let result = ScenarioRunner::new(42)
//!     .with_speed(2.0)
//!     .run(ScenarioId::RelayDemo);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod runner;

pub use context::SimContext;
pub use exporter::{ExportedEvent, PlaybackExport};
pub use runner::{ScenarioResult, ScenarioRunner};
