//! Agent view-state: who is on screen, in what state, where.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Lead,
    Worker,
    Architect,
    Researcher,
    Devops,
    Default,
}

impl AgentRole {
    /// Unknown role names map to `Default`.
    pub fn parse(role: &str) -> Self {
        match role {
            "lead" => AgentRole::Lead,
            "worker" => AgentRole::Worker,
            "architect" => AgentRole::Architect,
            "researcher" => AgentRole::Researcher,
            "devops" => AgentRole::Devops,
            _ => AgentRole::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Active,
    Busy,
    Error,
    Spawning,
    Releasing,
}

impl AgentStatus {
    /// Unknown status names map to `Idle`.
    pub fn parse(status: &str) -> Self {
        match status {
            "active" => AgentStatus::Active,
            "busy" => AgentStatus::Busy,
            "error" => AgentStatus::Error,
            "spawning" => AgentStatus::Spawning,
            "releasing" => AgentStatus::Releasing,
            _ => AgentStatus::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub x: f64,
    pub y: f64,
    /// Monotonic time of the spawn
    pub spawned_at: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawned_by: Option<String>,
}

/// Agents in spawn order.
#[derive(Debug, Clone, Default)]
pub struct AgentStore {
    agents: Vec<Agent>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an agent, or replaces one with the same id in place.
    pub fn spawn(&mut self, agent: Agent) {
        match self.agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn release(&mut self, id: &str) -> Option<Agent> {
        let idx = self.agents.iter().position(|a| a.id == id)?;
        Some(self.agents.remove(idx))
    }

    /// Returns false when the agent is unknown.
    pub fn update_status(&mut self, id: &str, status: AgentStatus) -> bool {
        match self.get_mut(id) {
            Some(agent) => {
                agent.status = status;
                true
            }
            None => false,
        }
    }

    pub fn update_position(&mut self, id: &str, x: f64, y: f64) -> bool {
        match self.get_mut(id) {
            Some(agent) => {
                agent.x = x;
                agent.y = y;
                true
            }
            None => false,
        }
    }

    /// Replaces the whole set (initial state).
    pub fn set_agents(&mut self, agents: Vec<Agent>) {
        self.agents.clear();
        for agent in agents {
            self.spawn(agent);
        }
    }

    pub fn clear(&mut self) {
        self.agents.clear();
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn count_by_role(&self) -> BTreeMap<AgentRole, usize> {
        let mut counts = BTreeMap::new();
        for agent in &self.agents {
            *counts.entry(agent.role).or_insert(0) += 1;
        }
        counts
    }

    /// Spreads the agents evenly on a circle, first one at the top.
    pub fn layout_circle(&mut self, center_x: f64, center_y: f64, radius: f64) {
        let count = self.agents.len() as f64;
        for (i, agent) in self.agents.iter_mut().enumerate() {
            let (x, y) = circle_point(i as f64 / count, center_x, center_y, radius);
            agent.x = x;
            agent.y = y;
        }
    }
}

/// Point at `fraction` of a full turn, starting at 12 o'clock.
pub fn circle_point(fraction: f64, center_x: f64, center_y: f64, radius: f64) -> (f64, f64) {
    let angle = fraction * PI * 2.0 - PI / 2.0;
    (center_x + angle.cos() * radius, center_y + angle.sin() * radius)
}
