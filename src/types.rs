// src/types.rs

use serde::{Deserialize, Serialize};

/// Lane identifier; lanes are numbered `0..lane_count`.
pub type LaneId = usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lanes: LanesConfig,
    pub signal: SignalConfig,
    pub timing: TimingConfig,
    pub detection: DetectionConfig,
    pub session: SessionConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lanes: LanesConfig::default(),
            signal: SignalConfig::default(),
            timing: TimingConfig::default(),
            detection: DetectionConfig::default(),
            session: SessionConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanesConfig {
    /// One video source per lane, in lane-ID order
    pub sources: Vec<String>,
    /// Lanes that share a green phase
    pub pairs: Vec<[LaneId; 2]>,
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            sources: (1..=4)
                .map(|i| format!("data/sample_videos/lane{}.mp4", i))
                .collect(),
            pairs: vec![[0, 2], [1, 3]],
        }
    }
}

impl LanesConfig {
    pub fn lane_count(&self) -> usize {
        self.sources.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub yellow_duration: u32,
    pub min_green_time: u32,
    pub max_green_time: u32,
    pub base_green_time: u32,
    pub emergency_priority_time: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            yellow_duration: 2,
            min_green_time: 5,
            max_green_time: 45,
            base_green_time: 6,
            emergency_priority_time: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub vehicle_time_weight: f64,
    pub person_time_weight: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            vehicle_time_weight: 0.5,
            person_time_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: String,
    pub confidence_threshold: f32,
    /// Run detection on every n-th frame of a lane; other frames report zero counts
    pub process_every_n_frames: u32,
    /// Frames wider than this are downscaled before detection
    pub frame_width: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: 0.4,
            process_every_n_frames: 1,
            frame_width: 640,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause between a snapshot emission and the next tick
    pub tick_delay_ms: u64,
    /// JSON-lines snapshot output; stdout when unset
    pub snapshot_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_delay_ms: 60,
            snapshot_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub frame_width: usize,
    pub frame_height: usize,
    /// Frames per synthetic clip before the source reports end of stream
    pub frames_per_clip: u64,
    /// Mean number of vehicles per frame, per lane
    pub traffic_density: Vec<f64>,
    /// Mean number of pedestrians per frame, per lane
    pub pedestrian_density: Vec<f64>,
    /// Chance that a frame contains an emergency vehicle
    pub emergency_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            frame_width: 320,
            frame_height: 240,
            frames_per_clip: 300,
            traffic_density: vec![8.0, 3.0, 5.0, 1.0],
            pedestrian_density: vec![1.0, 2.0, 0.5, 0.0],
            emergency_probability: 0.002,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Packed RGB8 frame as handed between a lane source, the detector and the renderer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }
}

/// One tick's view of a lane. Immutable once produced by the collector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneObservation {
    pub lane_id: LaneId,
    pub vehicle_count: u32,
    pub person_count: u32,
    pub emergency_detected: bool,
    /// Encoded, annotated frame; empty when nothing could be rendered
    pub rendered_frame: Vec<u8>,
    /// False for skipped ticks and failed lanes
    pub detection_ran: bool,
}

impl LaneObservation {
    /// Zero-valued observation used for failed lanes.
    pub fn empty(lane_id: LaneId) -> Self {
        Self {
            lane_id,
            ..Self::default()
        }
    }
}
