//! Production implementation of RelayContext using Tokio.

use crate::{EventId, RelayContext};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Real-time context backed by Tokio timers and random UUIDs.
///
/// Monotonic time comes from `tokio::time::Instant` (so a paused test
/// runtime controls it), wall-clock time from the system clock.
/// Identifiers are UUID v4.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.to_string();
        tokio::spawn(async move {
            future.await;
            tracing::debug!(task = %name, "task finished");
        });
    }

    fn new_id(&self) -> EventId {
        EventId::new()
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}
