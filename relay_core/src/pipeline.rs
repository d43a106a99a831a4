//! Relay pipeline dashboard feed.
//!
//! A seeded generator of stage events (`queue → socket → pty → verification`)
//! plus the rolling metrics the dashboard header shows.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::trace;

use crate::config::PipelineConfig;
use crate::history::History;

/// Events considered by the success-rate and latency metrics.
const METRICS_WINDOW: usize = 20;
/// Events considered by the throughput metric.
const THROUGHPUT_WINDOW: usize = 8;
/// Span assumed when the throughput window has no spread.
const FALLBACK_SPAN_MS: u64 = 1000;
/// Latency jitter added on top of the stage base.
const LATENCY_JITTER_MS: f64 = 40.0;

/// Placeholder rendered for metrics of an empty feed.
pub const NO_VALUE: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Queue,
    Socket,
    Pty,
    Verification,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [Stage::Queue, Stage::Socket, Stage::Pty, Stage::Verification];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queue => "queue",
            Stage::Socket => "socket",
            Stage::Pty => "pty",
            Stage::Verification => "verification",
        }
    }

    pub fn actor(&self) -> &'static str {
        match self {
            Stage::Queue => "Daemon",
            Stage::Socket => "Relay",
            Stage::Pty => "Agent PTY",
            Stage::Verification => "Verifier",
        }
    }

    fn base_latency_ms(&self) -> f64 {
        match self {
            Stage::Queue => 35.0,
            Stage::Socket => 60.0,
            Stage::Pty => 85.0,
            Stage::Verification => 45.0,
        }
    }

    fn samples(&self) -> &'static [&'static str] {
        match self {
            Stage::Queue => &[
                "Daemon queued command bundle",
                "Prefetching dependency map",
                "Compressing payload",
                "Snapshotting filesystem delta",
            ],
            Stage::Socket => &[
                "Relay opened secure WebSocket",
                "Negotiating protocol features",
                "Upgrading connection with mTLS",
                "Streaming chunks to agent socket",
            ],
            Stage::Pty => &[
                "Injecting command into PTY",
                "Applying terminal shim",
                "PTY echo suppression enabled",
                "Forwarding stdout/stderr",
            ],
            Stage::Verification => &[
                "Checksum verification",
                "Signature validated",
                "Policy pass: sandboxed",
                "Post-flight integrity audit",
            ],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Ok,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: String,
    pub stage: Stage,
    pub actor: String,
    pub message: String,
    pub status: StageStatus,
    pub latency: u64,
    /// Milliseconds on the feed clock
    pub ts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    pub throughput_per_min: u64,
    /// Whole percent
    pub success_rate: u64,
    pub avg_latency_ms: u64,
}

/// Dashboard header strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricLabels {
    pub throughput: String,
    pub success_rate: String,
    pub latency: String,
}

impl MetricLabels {
    pub fn from_metrics(metrics: Option<&PipelineMetrics>) -> Self {
        match metrics {
            Some(m) => Self {
                throughput: format!("{}/min", m.throughput_per_min),
                success_rate: format!("{}%", m.success_rate),
                latency: format!("{} ms", m.avg_latency_ms),
            },
            None => Self {
                throughput: NO_VALUE.to_string(),
                success_rate: NO_VALUE.to_string(),
                latency: NO_VALUE.to_string(),
            },
        }
    }
}

pub struct PipelineFeed {
    config: PipelineConfig,
    rng: ChaCha8Rng,
    tick: u64,
    events: History<PipelineEvent>,
}

impl PipelineFeed {
    pub fn new(config: PipelineConfig, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            tick: 0,
            events: History::new(config.history_cap),
            config,
        }
    }

    /// Produces the next stage event at feed time `now`.
    pub fn tick(&mut self, now: Duration) -> PipelineEvent {
        let stage = Stage::ORDER[(self.tick % Stage::ORDER.len() as u64) as usize];
        self.tick += 1;

        let ok = self.rng.gen::<f64>() < self.config.success_rate;
        let message = stage
            .samples()
            .choose(&mut self.rng)
            .copied()
            .unwrap_or_default();
        let jitter = self.rng.gen::<f64>() * LATENCY_JITTER_MS;
        let ts = now.as_millis() as u64;

        let event = PipelineEvent {
            id: format!("evt-{}-{}", ts, self.tick),
            stage,
            actor: stage.actor().to_string(),
            message: message.to_string(),
            status: if ok { StageStatus::Ok } else { StageStatus::Fail },
            latency: (stage.base_latency_ms() + jitter).round() as u64,
            ts,
        };

        trace!(stage = %stage, tick = self.tick, "pipeline tick");
        self.events.push(event.clone());
        event
    }

    /// Runs `count` ticks spaced by the configured interval, starting at
    /// `start`.
    pub fn run(&mut self, start: Duration, count: usize) {
        for i in 0..count {
            let offset = self.config.tick_ms.saturating_mul(i as u64);
            self.tick(start.saturating_add(Duration::from_millis(offset)));
        }
    }

    /// Newest first.
    pub fn events(&self) -> &History<PipelineEvent> {
        &self.events
    }

    /// Stage of the newest event; `queue` before anything ran.
    pub fn active_stage(&self) -> Stage {
        self.events.latest().map(|e| e.stage).unwrap_or(Stage::Queue)
    }

    pub fn metrics(&self) -> Option<PipelineMetrics> {
        let recent: Vec<&PipelineEvent> = self.events.recent(METRICS_WINDOW).collect();
        if recent.is_empty() {
            return None;
        }

        let ok = recent.iter().filter(|e| e.status == StageStatus::Ok).count();
        let success_rate = (ok as f64 / recent.len() as f64 * 100.0).round() as u64;

        let window = &recent[..recent.len().min(THROUGHPUT_WINDOW)];
        let newest = window[0].ts;
        let oldest = window[window.len() - 1].ts;
        let span = match newest.saturating_sub(oldest) {
            0 => FALLBACK_SPAN_MS,
            span => span,
        };
        let throughput = (window.len() as f64 / span as f64 * 60_000.0).round() as u64;

        let total_latency: u64 = recent.iter().map(|e| e.latency).sum();
        let avg_latency = (total_latency as f64 / recent.len() as f64).round() as u64;

        Some(PipelineMetrics {
            throughput_per_min: throughput.max(1),
            success_rate,
            avg_latency_ms: avg_latency,
        })
    }

    pub fn labels(&self) -> MetricLabels {
        MetricLabels::from_metrics(self.metrics().as_ref())
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.tick = 0;
    }
}
