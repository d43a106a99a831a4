//! Virtual-clock context for unit tests.

use async_trait::async_trait;
use relay_env::{EventId, RelayContext};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Clock that only moves when told to; ids are sequential.
pub struct ManualContext {
    now: Mutex<Duration>,
    next_id: AtomicU64,
}

impl ManualContext {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Duration::ZERO),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

#[async_trait]
impl RelayContext for ManualContext {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000) + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn spawn<F>(&self, _name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future);
    }

    fn new_id(&self) -> EventId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        EventId::from_random_bytes(bytes)
    }

    fn seed(&self) -> u64 {
        0
    }
}
