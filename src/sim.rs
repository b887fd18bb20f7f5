// src/sim.rs
//
// Synthetic lanes for running the controller without cameras or a model:
// flat gray clips of a fixed length, and a seeded detector that draws
// vehicle/pedestrian counts around a per-lane mean.

use crate::collector::LaneWorker;
use crate::detection::Detection;
use crate::interface::{Detector, LaneSource};
use crate::types::{Config, Frame, LaneId, SimulationConfig};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use tracing::debug;

const VEHICLE_LABELS: [&str; 5] = ["car", "truck", "bus", "motorbike", "bicycle"];
const EMERGENCY_LABELS: [&str; 3] = ["ambulance", "police car", "fire truck"];
/// Labels the detector may emit that the controller ignores
const CLUTTER_LABELS: [&str; 3] = ["traffic light", "stop sign", "dog"];

const FRAME_INTERVAL_MS: f64 = 1000.0 / 30.0;

pub struct SyntheticLaneSource {
    lane_id: LaneId,
    width: usize,
    height: usize,
    frames_per_clip: u64,
    position: u64,
}

impl SyntheticLaneSource {
    pub fn new(lane_id: LaneId, sim: &SimulationConfig) -> Self {
        Self {
            lane_id,
            width: sim.frame_width,
            height: sim.frame_height,
            frames_per_clip: sim.frames_per_clip,
            position: 0,
        }
    }
}

impl LaneSource for SyntheticLaneSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.position >= self.frames_per_clip {
            return Ok(None);
        }
        self.position += 1;

        // Slightly different shade per lane so the streams are distinguishable
        let shade = 80u8.saturating_add((self.lane_id as u8).saturating_mul(24));
        Ok(Some(Frame {
            data: vec![shade; self.width * self.height * 3],
            width: self.width,
            height: self.height,
            timestamp_ms: self.position as f64 * FRAME_INTERVAL_MS,
        }))
    }

    fn restart(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn release(&mut self) {
        debug!("Synthetic lane {} stopped at frame {}", self.lane_id, self.position);
    }

    fn describe(&self) -> String {
        format!("synthetic lane {}", self.lane_id)
    }
}

pub struct SyntheticDetector {
    rng: StdRng,
    vehicle_mean: f64,
    person_mean: f64,
    emergency_probability: f64,
}

impl SyntheticDetector {
    pub fn new(seed: u64, vehicle_mean: f64, person_mean: f64, emergency_probability: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            vehicle_mean: vehicle_mean.max(0.0),
            person_mean: person_mean.max(0.0),
            emergency_probability: emergency_probability.clamp(0.0, 1.0),
        }
    }

    /// Lanes without a configured density see no traffic.
    pub fn for_lane(lane_id: LaneId, sim: &SimulationConfig) -> Self {
        Self::new(
            sim.seed.wrapping_add(lane_id as u64),
            sim.traffic_density.get(lane_id).copied().unwrap_or(0.0),
            sim.pedestrian_density.get(lane_id).copied().unwrap_or(0.0),
            sim.emergency_probability,
        )
    }

    /// Object count for one frame. `Poisson` rejects a zero mean, so empty
    /// lanes short-circuit.
    fn poisson(&mut self, mean: f64) -> Result<usize> {
        if mean <= 0.0 {
            return Ok(0);
        }
        let dist = Poisson::new(mean).with_context(|| format!("invalid traffic density {}", mean))?;
        Ok(dist.sample(&mut self.rng) as usize)
    }

    fn random_box(&mut self, frame: &Frame) -> [f32; 4] {
        let w = frame.width.max(2) as f32;
        let h = frame.height.max(2) as f32;
        let x1 = self.rng.gen_range(0.0..w * 0.8);
        let y1 = self.rng.gen_range(0.0..h * 0.8);
        let bw = self.rng.gen_range(w * 0.05..w * 0.2);
        let bh = self.rng.gen_range(h * 0.05..h * 0.2);
        [x1, y1, (x1 + bw).min(w - 1.0), (y1 + bh).min(h - 1.0)]
    }

    fn push(&mut self, out: &mut Vec<Detection>, label: &str, frame: &Frame) {
        let confidence = self.rng.gen_range(0.25..0.98);
        let bbox = self.random_box(frame);
        out.push(Detection::new(label, confidence, bbox));
    }
}

impl Detector for SyntheticDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let mut detections = Vec::new();

        for _ in 0..self.poisson(self.vehicle_mean)? {
            let label = VEHICLE_LABELS[self.rng.gen_range(0..VEHICLE_LABELS.len())];
            self.push(&mut detections, label, frame);
        }
        for _ in 0..self.poisson(self.person_mean)? {
            self.push(&mut detections, "person", frame);
        }
        if self.rng.gen_bool(0.2) {
            let label = CLUTTER_LABELS[self.rng.gen_range(0..CLUTTER_LABELS.len())];
            self.push(&mut detections, label, frame);
        }
        if self.rng.gen_bool(self.emergency_probability) {
            let label = EMERGENCY_LABELS[self.rng.gen_range(0..EMERGENCY_LABELS.len())];
            let bbox = self.random_box(frame);
            detections.push(Detection::new(label, 0.9, bbox));
        }

        Ok(detections)
    }
}

/// One synthetic worker per configured lane.
pub fn synthetic_workers(config: &Config) -> Vec<LaneWorker> {
    (0..config.lanes.lane_count())
        .map(|lane_id| {
            LaneWorker::new(
                lane_id,
                Box::new(SyntheticLaneSource::new(lane_id, &config.simulation)),
                Box::new(SyntheticDetector::for_lane(lane_id, &config.simulation)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{tally, ObjectCategory};

    fn sim() -> SimulationConfig {
        SimulationConfig {
            frames_per_clip: 3,
            ..SimulationConfig::default()
        }
    }

    fn frame() -> Frame {
        Frame {
            data: vec![0; 64 * 48 * 3],
            width: 64,
            height: 48,
            timestamp_ms: 0.0,
        }
    }

    #[test]
    fn test_source_ends_and_restarts() {
        let mut source = SyntheticLaneSource::new(1, &sim());
        for _ in 0..3 {
            let frame = source.next_frame().unwrap().unwrap();
            assert_eq!(frame.data.len(), 320 * 240 * 3);
        }
        assert!(source.next_frame().unwrap().is_none());

        source.restart().unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert!((frame.timestamp_ms - FRAME_INTERVAL_MS).abs() < 1e-9);
    }

    #[test]
    fn test_detector_is_deterministic_per_seed() {
        let mut a = SyntheticDetector::for_lane(0, &sim());
        let mut b = SyntheticDetector::for_lane(0, &sim());
        for _ in 0..10 {
            assert_eq!(a.detect(&frame()).unwrap(), b.detect(&frame()).unwrap());
        }
    }

    #[test]
    fn test_zero_density_yields_no_traffic() {
        let mut detector = SyntheticDetector::new(7, 0.0, 0.0, 0.0);
        for _ in 0..50 {
            let counts = tally(detector.detect(&frame()).unwrap(), 0.0);
            assert_eq!(counts.vehicles, 0);
            assert_eq!(counts.persons, 0);
            assert!(!counts.emergency_detected());
        }
    }

    #[test]
    fn test_certain_emergency() {
        let mut detector = SyntheticDetector::new(7, 2.0, 1.0, 1.0);
        let counts = tally(detector.detect(&frame()).unwrap(), 0.4);
        assert!(counts.emergency_detected());
        assert!(counts
            .kept
            .iter()
            .any(|d| d.category == ObjectCategory::Emergency));
    }

    #[test]
    fn test_density_roughly_matches_mean() {
        let mut detector = SyntheticDetector::new(3, 8.0, 0.0, 0.0);
        let total: u32 = (0..500)
            .map(|_| tally(detector.detect(&frame()).unwrap(), 0.0).vehicles)
            .sum();
        let mean = total as f64 / 500.0;
        assert!((6.5..9.5).contains(&mean), "mean was {}", mean);
    }

    #[test]
    fn test_unbounded_density_is_a_detector_error() {
        let mut detector = SyntheticDetector::new(5, f64::INFINITY, 0.0, 0.0);
        assert!(detector.detect(&frame()).is_err());
    }

    #[test]
    fn test_boxes_stay_inside_frame() {
        let mut detector = SyntheticDetector::new(11, 5.0, 5.0, 0.5);
        let f = frame();
        for _ in 0..20 {
            for det in detector.detect(&f).unwrap() {
                let [x1, y1, x2, y2] = det.bbox;
                assert!(x1 >= 0.0 && y1 >= 0.0);
                assert!(x2 <= 63.0 && y2 <= 47.0);
                assert!(x1 <= x2 && y1 <= y2);
            }
        }
    }

    #[test]
    fn test_synthetic_workers_cover_every_lane() {
        let workers = synthetic_workers(&Config::default());
        let ids: Vec<LaneId> = workers.iter().map(|w| w.lane_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
