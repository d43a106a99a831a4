//! Core environment context trait for relay playback.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

use crate::types::EventId;

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the scenario player and the
/// display stores can run both in real time (tokio) and against a virtual
/// clock (simulation, tests).
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, random UUIDs
/// - **Simulation**: `SimContext` - manual virtual clock, seeded identifiers
///
/// # Determinism
///
/// Every source of non-determinism the player touches (time, identifiers)
/// goes through this trait, so a simulation run is reproducible from its seed.
#[async_trait]
pub trait RelayContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// Scheduling deadlines are expressed on this clock.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used for event timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Generates a fresh, unique event identifier.
    fn new_id(&self) -> EventId;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
