//! JSON exporter for playback runs.
//!
//! Writes the emitted events with their virtual emission times so a run can
//! be inspected or fed to a viewer offline.

use relay_core::stores::EventStats;
use relay_core::{Event, Result, Session};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::runner::ScenarioResult;

/// One emitted event and when it fired.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedEvent {
    /// Milliseconds of virtual time since playback started
    pub at_ms: f64,
    pub event: Event,
}

/// Complete playback export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackExport {
    pub scenario: String,
    pub seed: u64,
    pub speed: f64,
    pub duration_ms: u64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    pub stats: EventStats,
    pub events: Vec<ExportedEvent>,
}

impl PlaybackExport {
    pub fn new(scenario: &str, seed: u64, speed: f64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            speed,
            duration_ms: 0,
            passed: false,
            failure_reason: None,
            session: None,
            stats: EventStats::default(),
            events: Vec::new(),
        }
    }

    pub fn from_result(result: &ScenarioResult) -> Self {
        let mut export = Self::new(result.scenario.name(), result.seed, result.speed);
        for (event, at) in result.events.iter().zip(&result.emitted_at) {
            export.add_event(at.as_secs_f64() * 1000.0, event.clone());
        }
        export.session = result.session.clone();
        export.stats = result.stats;
        export.finalize(result.passed, result.failure_reason.clone(), result.final_time_ms());
        export
    }

    pub fn add_event(&mut self, at_ms: f64, event: Event) {
        self.events.push(ExportedEvent { at_ms, event });
    }

    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, duration_ms: u64) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.duration_ms = duration_ms;
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
