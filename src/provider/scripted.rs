// src/provider/scripted.rs
//! Replays a fixed sequence of fixes and errors on a timeline

use super::{PositionProvider, ProviderError, ProviderSink};
use crate::{
    error::{LocationError, Result},
    geo::GeoPoint,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What happens at one point of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptStep {
    Fix { latitude: f64, longitude: f64, accuracy_m: f64 },
    Unavailable { message: String },
    Unauthorized { message: String },
}

/// A step scheduled `at_ms` milliseconds after the provider was started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedEvent {
    pub at_ms: u64,
    #[serde(flatten)]
    pub step: ScriptStep,
}

impl ScriptedEvent {
    pub fn fix(at_ms: u64, latitude: f64, longitude: f64, accuracy_m: f64) -> Self {
        Self {
            at_ms,
            step: ScriptStep::Fix { latitude, longitude, accuracy_m },
        }
    }

    pub fn unavailable(at_ms: u64, message: &str) -> Self {
        Self {
            at_ms,
            step: ScriptStep::Unavailable { message: message.to_string() },
        }
    }

    pub fn unauthorized(at_ms: u64, message: &str) -> Self {
        Self {
            at_ms,
            step: ScriptStep::Unauthorized { message: message.to_string() },
        }
    }
}

/// Scripts for both provider slots, as stored in a scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub primary: Vec<ScriptedEvent>,
    #[serde(default)]
    pub fallback: Vec<ScriptedEvent>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LocationError::Other(format!("Failed to read scenario {}: {}", path.display(), e)))?;
        let scenario: Self = serde_json::from_str(&contents)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Rejects fixes with coordinates out of range.
    pub fn validate(&self) -> Result<()> {
        for event in self.primary.iter().chain(self.fallback.iter()) {
            if let ScriptStep::Fix { latitude, longitude, .. } = event.step {
                GeoPoint::new(latitude, longitude)?;
            }
        }
        Ok(())
    }
}

/// Provider that plays back a script on the tokio clock. Every `start`
/// replays the script from the beginning.
pub struct ScriptedProvider {
    name: String,
    events: Vec<ScriptedEvent>,
    task: Option<JoinHandle<()>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, mut events: Vec<ScriptedEvent>) -> Self {
        events.sort_by_key(|e| e.at_ms);
        Self {
            name: name.to_string(),
            events,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl PositionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, sink: ProviderSink) -> Result<()> {
        self.stop();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LocationError::Other(format!("{} needs a tokio runtime: {}", self.name, e)))?;
        let events = self.events.clone();

        self.task = Some(runtime.spawn(async move {
            let started = tokio::time::Instant::now();
            for event in events {
                tokio::time::sleep_until(started + Duration::from_millis(event.at_ms)).await;
                let delivered = match event.step {
                    ScriptStep::Fix { latitude, longitude, accuracy_m } => {
                        match GeoPoint::new(latitude, longitude) {
                            Ok(point) => sink.fix(point, accuracy_m),
                            Err(e) => {
                                tracing::warn!("skipping scripted fix: {}", e);
                                true
                            }
                        }
                    }
                    ScriptStep::Unavailable { message } => sink.error(ProviderError::Unavailable(message)),
                    ScriptStep::Unauthorized { message } => sink.error(ProviderError::Unauthorized(message)),
                };
                if !delivered {
                    break;
                }
            }
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ScriptedProvider {
    fn drop(&mut self) {
        self.stop();
    }
}
