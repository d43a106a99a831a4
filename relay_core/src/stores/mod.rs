//! Display stores: projections of emitted events for a renderer.

pub mod agents;
pub mod hub;
pub mod messages;

pub use agents::{Agent, AgentRole, AgentStatus, AgentStore};
pub use hub::{DaemonState, EventStats, StoreHub};
pub use messages::{Connection, DeliveryStatus, Message, MessageStore};
