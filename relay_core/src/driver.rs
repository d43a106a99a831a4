//! Real-time driver for the scenario player.
//!
//! [`PlayerHandle::spawn`] moves a [`Player`] behind a mutex and runs a
//! background task on the context:
//!
//! ```text
//! loop:
//!   lock → poll() → next_deadline() → unlock
//!   select { sleep(deadline - now), control call woke us }
//! ```
//!
//! Control calls take the same lock, so they are serialized with emission
//! and cancellation is complete by the time they return.

use relay_env::RelayContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch, Notify};
use tracing::debug;

use crate::config::PlayerConfig;
use crate::event::Event;
use crate::player::{Player, PlayerState, SpeedControl};
use crate::scenario::{Scenario, Session};

struct Shared<C: RelayContext> {
    player: Mutex<Player<C>>,
    wake: Notify,
    shutdown: AtomicBool,
}

impl<C: RelayContext> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Player<C>> {
        self.player.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to a player driven by a background task.
///
/// The task runs until [`PlayerHandle::shutdown`] is called.
pub struct PlayerHandle<C: RelayContext> {
    shared: Arc<Shared<C>>,
}

impl<C: RelayContext> Clone for PlayerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: RelayContext> PlayerHandle<C> {
    /// Creates an idle player and spawns its driver task on `ctx`.
    pub fn spawn(ctx: Arc<C>, config: PlayerConfig) -> Self {
        let shared = Arc::new(Shared {
            player: Mutex::new(Player::new(Arc::clone(&ctx), config)),
            wake: Notify::new(),
            shutdown: AtomicBool::new(false),
        });

        let task_ctx = Arc::clone(&ctx);
        let task_shared = Arc::clone(&shared);
        ctx.spawn("relay-player", async move {
            drive(task_ctx, task_shared).await;
        });

        Self { shared }
    }

    pub fn start(&self, scenario: Option<Scenario>, speed: Option<f64>) {
        self.control(|p| p.start(scenario, speed));
    }

    pub fn stop(&self) {
        self.control(Player::stop);
    }

    pub fn pause(&self) {
        self.control(Player::pause);
    }

    pub fn resume(&self) {
        self.control(Player::resume);
    }

    /// Runs `f` against the player under the lock, then wakes the driver.
    pub fn control<R>(&self, f: impl FnOnce(&mut Player<C>) -> R) -> R {
        let result = f(&mut self.shared.lock());
        self.shared.wake.notify_one();
        result
    }

    pub fn speed(&self) -> SpeedControl {
        self.shared.lock().speed()
    }

    pub fn state(&self) -> PlayerState {
        self.shared.lock().state()
    }

    /// Emitted events, newest first.
    pub fn timeline(&self) -> Vec<Event> {
        self.shared.lock().timeline().to_vec()
    }

    pub fn session(&self) -> Option<Session> {
        self.shared.lock().session()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.lock().subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<PlayerState> {
        self.shared.lock().watch_state()
    }

    pub fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.shared.lock().watch_session()
    }

    /// Stops playback and ends the driver task.
    pub fn shutdown(&self) {
        self.shared.lock().stop();
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }
}

async fn drive<C: RelayContext>(ctx: Arc<C>, shared: Arc<Shared<C>>) {
    debug!("player driver started");

    while !shared.shutdown.load(Ordering::SeqCst) {
        let deadline = {
            let mut player = shared.lock();
            player.poll();
            player.next_deadline()
        };

        match deadline {
            Some(due) => {
                let wait = due.saturating_sub(ctx.now());
                tokio::select! {
                    _ = ctx.sleep(wait) => {}
                    _ = shared.wake.notified() => {}
                }
            }
            None => shared.wake.notified().await,
        }
    }

    debug!("player driver stopped");
}
