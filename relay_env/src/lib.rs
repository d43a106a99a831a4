//! Relay Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the scenario player
//! to run both in **real time** (tokio) and against a **virtual clock**
//! (simulation and tests).
//!
//! # Core Concept
//!
//! The player never reads the clock or generates identifiers on its own:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Identity (`new_id()`)
//!
//! By routing both through a context, a simulated run derives all of its
//! entropy from one 64-bit seed and replays identically.
//!
//! # Example
//!
//! ```ignore
//! use relay_env::{RelayContext, TokioContext};
//!
//! async fn tick_loop<Ctx: RelayContext>(ctx: &Ctx) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(200)).await;
//!         println!("{} {:?}", ctx.new_id(), ctx.now());
//!     }
//! }
//! ```

mod context;
mod types;
mod tokio_impl;

pub use context::RelayContext;
pub use types::EventId;
pub use tokio_impl::TokioContext;
