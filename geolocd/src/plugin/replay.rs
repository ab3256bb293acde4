//! Replay plugin - plays recorded fixes back as a position source.
//!
//! Reads a JSON-lines file of fixes and serves them in order, wrapping
//! around at the end. Single requests are answered after one interval;
//! tracking emits one fix per interval on a tokio task until disabled.
//!
//! ```text
//! {"latitude": 37.1, "longitude": -122.1, "horizontal": 12.0}
//! {"latitude": 37.1018, "longitude": -122.1, "altitude": 30.5}
//! {"error": "TIMEOUT"}
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{GnssPlugin, PluginCallbacks, PositionMode, PositionPlugin};
use crate::error::ErrorCode;
use crate::position::{Accuracy, AccuracyLevel, FixResult, Position};

/// One recorded fix. Either coordinates or an error code name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayFix {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub direction: Option<f64>,
    #[serde(default)]
    pub horizontal: f64,
    #[serde(default)]
    pub vertical: f64,
    pub error: Option<String>,
}

impl ReplayFix {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            speed: None,
            direction: None,
            horizontal: 0.0,
            vertical: 0.0,
            error: None,
        }
    }

    /// Turn the record into a fix stamped with the current time.
    fn to_result(&self) -> FixResult {
        if let Some(name) = &self.error {
            return Err(name.parse().unwrap_or(ErrorCode::NotAvailable));
        }

        let mut position =
            Position::now(self.latitude, self.longitude).ok_or(ErrorCode::WrongParameter)?;
        if let Some(v) = self.altitude {
            position = position.with_altitude(v);
        }
        if let Some(v) = self.speed {
            position = position.with_speed(v);
        }
        if let Some(v) = self.direction {
            position = position.with_direction(v);
        }

        let accuracy = if self.horizontal > 0.0 {
            Accuracy::new(AccuracyLevel::Detailed, self.horizontal, self.vertical)
        } else {
            Accuracy::UNKNOWN
        };
        Ok((position, accuracy))
    }
}

/// Errors loading a replay file.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read replay file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid fix on line {line} of {path}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Replay file {0} contains no fixes")]
    Empty(PathBuf),
}

#[derive(Default)]
struct ReplayState {
    callbacks: Option<PluginCallbacks>,
    cursor: usize,
    tracking: Option<CancellationToken>,
}

/// Position source that replays recorded fixes.
pub struct ReplayPlugin {
    name: String,
    fixes: Vec<ReplayFix>,
    interval: Mutex<Duration>,
    state: Mutex<ReplayState>,
}

impl std::fmt::Debug for ReplayPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayPlugin")
            .field("name", &self.name)
            .field("fixes", &self.fixes.len())
            .field("interval", &*self.interval.lock())
            .finish()
    }
}

impl ReplayPlugin {
    pub fn new(name: impl Into<String>, fixes: Vec<ReplayFix>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            fixes,
            interval: Mutex::new(interval),
            state: Mutex::new(ReplayState::default()),
        }
    }

    /// Load fixes from a JSON-lines file. Blank lines and `#` comments are skipped.
    pub fn load(
        name: impl Into<String>,
        path: &Path,
        interval: Duration,
    ) -> Result<Self, ReplayError> {
        let content = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut fixes = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fix = serde_json::from_str(line).map_err(|source| ReplayError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                source,
            })?;
            fixes.push(fix);
        }

        if fixes.is_empty() {
            return Err(ReplayError::Empty(path.to_path_buf()));
        }

        let name = name.into();
        tracing::debug!(plugin = %name, fixes = fixes.len(), "Replay file loaded");
        Ok(Self::new(name, fixes, interval))
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    fn runtime() -> Result<tokio::runtime::Handle, ErrorCode> {
        tokio::runtime::Handle::try_current().map_err(|_| ErrorCode::Multithread)
    }
}

impl PositionPlugin for ReplayPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, callbacks: PluginCallbacks) -> Result<(), ErrorCode> {
        if self.fixes.is_empty() {
            return Err(ErrorCode::NotAvailable);
        }
        self.state.lock().callbacks = Some(callbacks);
        Ok(())
    }

    fn stop(&self) -> Result<(), ErrorCode> {
        let mut state = self.state.lock();
        if let Some(token) = state.tracking.take() {
            token.cancel();
        }
        state.callbacks = None;
        Ok(())
    }

    fn get_position(&self) -> Result<(), ErrorCode> {
        let handle = Self::runtime()?;
        let delay = *self.interval.lock();

        let mut state = self.state.lock();
        let callbacks = state.callbacks.clone().ok_or(ErrorCode::NotStarted)?;
        let fix = self.fixes[state.cursor % self.fixes.len()].to_result();
        state.cursor += 1;

        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callbacks.position(fix);
        });
        Ok(())
    }

    fn start_tracking(&self, enable: bool) -> Result<(), ErrorCode> {
        let mut state = self.state.lock();

        if !enable {
            if let Some(token) = state.tracking.take() {
                token.cancel();
            }
            return Ok(());
        }

        if state.tracking.is_some() {
            return Ok(());
        }

        let handle = Self::runtime()?;
        let callbacks = state.callbacks.clone().ok_or(ErrorCode::NotStarted)?;
        let token = CancellationToken::new();
        state.tracking = Some(token.clone());

        let fixes = self.fixes.clone();
        let mut cursor = state.cursor;
        let period = *self.interval.lock();
        let name = self.name.clone();

        handle.spawn(async move {
            tracing::debug!(plugin = %name, "Replay tracking started");
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        callbacks.position(fixes[cursor % fixes.len()].to_result());
                        cursor += 1;
                    }
                }
            }
            tracing::debug!(plugin = %name, "Replay tracking stopped");
        });
        Ok(())
    }
}

impl GnssPlugin for ReplayPlugin {
    fn set_position_mode(&self, mode: PositionMode, fix_interval: Duration) -> Result<(), ErrorCode> {
        tracing::debug!(
            plugin = %self.name,
            mode = %mode,
            fix_interval_ms = fix_interval.as_millis() as u64,
            "Replay position mode set"
        );
        *self.interval.lock() = fix_interval;
        Ok(())
    }
}

impl Drop for ReplayPlugin {
    fn drop(&mut self) {
        if let Some(token) = self.state.get_mut().tracking.take() {
            token.cancel();
        }
    }
}
