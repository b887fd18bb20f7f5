// src/config.rs
//
// Loading and validating the YAML configuration, plus the runtime-tunable
// subset of it (SessionParams) that running sessions observe through a
// watch channel.

use crate::collector::LaneSettings;
use crate::signal::LanePairs;
use crate::timing::TimingParams;
use crate::types::Config;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("confidence threshold must be between 0 and 1, got {0}")]
    ConfidenceOutOfRange(f32),

    #[error("min green time ({min}s) exceeds max green time ({max}s)")]
    GreenBounds { min: u32, max: u32 },

    #[error("frame skip stride must be at least 1")]
    ZeroFrameSkip,

    #[error("at least one lane is required")]
    NoLanes,

    #[error("invalid lane pairing: {0}")]
    Pairing(String),

    #[error("{workers} lane workers for {lanes} configured lanes")]
    LaneCountMismatch { workers: usize, lanes: usize },
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to the built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lanes.lane_count() == 0 {
            return Err(ConfigError::NoLanes);
        }
        LanePairs::new(self.lanes.pairs.clone(), self.lanes.lane_count())?;
        self.session_params().validate()
    }

    pub fn lane_pairs(&self) -> Result<LanePairs, ConfigError> {
        LanePairs::new(self.lanes.pairs.clone(), self.lanes.lane_count())
    }

    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            timing: TimingParams {
                base_green: self.signal.base_green_time,
                min_green: self.signal.min_green_time,
                max_green: self.signal.max_green_time,
                vehicle_weight: self.timing.vehicle_time_weight,
                person_weight: self.timing.person_time_weight,
                emergency_priority: self.signal.emergency_priority_time,
            },
            yellow_duration: self.signal.yellow_duration,
            confidence_threshold: self.detection.confidence_threshold,
            frame_skip: self.detection.process_every_n_frames,
            frame_width: self.detection.frame_width,
            tick_delay: Duration::from_millis(self.session.tick_delay_ms),
        }
    }
}

/// Parameters a session reads at the start of every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    pub timing: TimingParams,
    pub yellow_duration: u32,
    pub confidence_threshold: f32,
    pub frame_skip: u32,
    pub frame_width: usize,
    pub tick_delay: Duration,
}

impl SessionParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ConfidenceOutOfRange(self.confidence_threshold));
        }
        if self.timing.min_green > self.timing.max_green {
            return Err(ConfigError::GreenBounds {
                min: self.timing.min_green,
                max: self.timing.max_green,
            });
        }
        if self.frame_skip == 0 {
            return Err(ConfigError::ZeroFrameSkip);
        }
        Ok(())
    }

    pub fn lane_settings(&self) -> LaneSettings {
        LaneSettings {
            confidence_threshold: self.confidence_threshold,
            frame_skip: self.frame_skip,
            frame_width: self.frame_width,
        }
    }
}

impl Default for SessionParams {
    fn default() -> Self {
        Config::default().session_params()
    }
}

/// Partial update applied while sessions are running. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub confidence_threshold: Option<f32>,
    pub yellow_duration: Option<u32>,
    pub min_green_time: Option<u32>,
    pub max_green_time: Option<u32>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.confidence_threshold.is_none()
            && self.yellow_duration.is_none()
            && self.min_green_time.is_none()
            && self.max_green_time.is_none()
    }

    /// Merge into a copy of `current`; the copy is returned only if it validates.
    pub fn apply_to(&self, current: &SessionParams) -> Result<SessionParams, ConfigError> {
        let mut next = current.clone();
        if let Some(threshold) = self.confidence_threshold {
            next.confidence_threshold = threshold;
        }
        if let Some(yellow) = self.yellow_duration {
            next.yellow_duration = yellow;
        }
        if let Some(min) = self.min_green_time {
            next.timing.min_green = min;
        }
        if let Some(max) = self.max_green_time {
            next.timing.max_green = max;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Shared entry point for runtime parameter updates.
#[derive(Debug, Clone)]
pub struct ParamsHandle {
    tx: Arc<watch::Sender<SessionParams>>,
}

impl ParamsHandle {
    pub fn new(params: SessionParams) -> Self {
        let (tx, _rx) = watch::channel(params);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionParams> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SessionParams {
        self.tx.borrow().clone()
    }

    /// Validate and publish an update. A rejected update leaves the
    /// current parameters untouched.
    pub fn apply(&self, update: &ConfigUpdate) -> Result<SessionParams, ConfigError> {
        let mut outcome = Ok(self.current());
        self.tx.send_if_modified(|params| match update.apply_to(params) {
            Ok(next) => {
                let changed = next != *params;
                *params = next.clone();
                outcome = Ok(next);
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });

        match &outcome {
            Ok(_) => info!("⚙️  Configuration updated: {:?}", update),
            Err(e) => warn!("Rejected configuration update {:?}: {}", update, e),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_mirror_service_settings() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let params = config.session_params();
        assert_eq!(params.yellow_duration, 2);
        assert_eq!(params.timing.min_green, 5);
        assert_eq!(params.timing.max_green, 45);
        assert_eq!(params.timing.base_green, 6);
        assert_eq!(params.timing.emergency_priority, 30);
        assert_eq!(params.confidence_threshold, 0.4);
        assert_eq!(params.frame_skip, 1);
        assert_eq!(params.tick_delay, Duration::from_millis(60));
    }

    #[test]
    fn test_load_partial_yaml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "signal:\n  yellow_duration: 3\n  emergency_priority_time: 20\ndetection:\n  confidence_threshold: 0.55\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.signal.yellow_duration, 3);
        assert_eq!(config.signal.emergency_priority_time, 20);
        assert_eq!(config.signal.max_green_time, 45);
        assert_eq!(config.detection.confidence_threshold, 0.55);
        assert_eq!(config.lanes.pairs, vec![[0, 2], [1, 3]]);
    }

    #[test]
    fn test_load_rejects_bad_pairing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "lanes:\n  sources: [a, b, c, d]\n  pairs: [[0, 1], [1, 3]]\n"
        )
        .unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(Config::load("/definitely/not/here.yaml").is_err());
    }

    #[test]
    fn test_update_rejects_out_of_range_confidence() {
        let handle = ParamsHandle::new(SessionParams::default());
        let rx = handle.subscribe();

        let update = ConfigUpdate {
            confidence_threshold: Some(1.5),
            yellow_duration: Some(9),
            ..Default::default()
        };
        assert_eq!(
            handle.apply(&update),
            Err(ConfigError::ConfidenceOutOfRange(1.5))
        );

        // Nothing from the rejected update leaks through
        assert_eq!(handle.current().confidence_threshold, 0.4);
        assert_eq!(handle.current().yellow_duration, 2);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_update_rejects_inverted_green_bounds() {
        let handle = ParamsHandle::new(SessionParams::default());
        let update = ConfigUpdate {
            min_green_time: Some(50),
            ..Default::default()
        };
        assert_eq!(
            handle.apply(&update),
            Err(ConfigError::GreenBounds { min: 50, max: 45 })
        );
        assert_eq!(handle.current().timing.min_green, 5);
    }

    #[test]
    fn test_update_is_published_to_subscribers() {
        let handle = ParamsHandle::new(SessionParams::default());
        let mut rx = handle.subscribe();

        let update = ConfigUpdate {
            confidence_threshold: Some(0.6),
            yellow_duration: Some(4),
            min_green_time: Some(8),
            max_green_time: Some(60),
        };
        let applied = handle.apply(&update).unwrap();

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen, applied);
        assert_eq!(seen.confidence_threshold, 0.6);
        assert_eq!(seen.yellow_duration, 4);
        assert_eq!(seen.timing.min_green, 8);
        assert_eq!(seen.timing.max_green, 60);
    }

    #[test]
    fn test_empty_update() {
        assert!(ConfigUpdate::default().is_empty());
        let handle = ParamsHandle::new(SessionParams::default());
        let applied = handle.apply(&ConfigUpdate::default()).unwrap();
        assert_eq!(applied, SessionParams::default());
    }
}
