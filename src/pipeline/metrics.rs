// src/pipeline/metrics.rs
//
// Session statistics. Owned by the control loop and written only from its
// tick; other tasks see published `RollingStats` copies.

use crate::types::LaneObservation;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;

/// Processing-time samples kept for the running average.
pub const PROCESSING_WINDOW: usize = 100;

#[derive(Debug)]
pub struct StatsAccumulator {
    ticks: u64,
    frames_processed: u64,
    vehicles_detected: u64,
    people_detected: u64,
    emergencies_detected: u64,
    processing_times: VecDeque<f64>,
    started_at: Instant,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            frames_processed: 0,
            vehicles_detected: 0,
            people_detected: 0,
            emergencies_detected: 0,
            processing_times: VecDeque::with_capacity(PROCESSING_WINDOW + 1),
            started_at: Instant::now(),
        }
    }

    /// Fold one tick into the counters. The window is FIFO: once it holds
    /// more than `PROCESSING_WINDOW` samples the oldest is dropped.
    pub fn record(&mut self, processing_time_secs: f64, observations: &[LaneObservation]) {
        self.ticks += 1;

        for obs in observations {
            if obs.detection_ran {
                self.frames_processed += 1;
            }
            self.vehicles_detected += obs.vehicle_count as u64;
            self.people_detected += obs.person_count as u64;
            if obs.emergency_detected {
                self.emergencies_detected += 1;
            }
        }

        self.processing_times.push_back(processing_time_secs);
        if self.processing_times.len() > PROCESSING_WINDOW {
            self.processing_times.pop_front();
        }
    }

    pub fn processing_window(&self) -> impl Iterator<Item = f64> + '_ {
        self.processing_times.iter().copied()
    }

    pub fn average_processing_time(&self) -> f64 {
        if self.processing_times.is_empty() {
            return 0.0;
        }
        self.processing_times.iter().sum::<f64>() / self.processing_times.len() as f64
    }

    pub fn snapshot(&self) -> RollingStats {
        RollingStats {
            ticks: self.ticks,
            total_frames_processed: self.frames_processed,
            total_vehicles_detected: self.vehicles_detected,
            total_people_detected: self.people_detected,
            emergency_vehicles_detected: self.emergencies_detected,
            average_processing_time: self.average_processing_time(),
            processing_samples: self.processing_times.len(),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the accumulator at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RollingStats {
    pub ticks: u64,
    pub total_frames_processed: u64,
    pub total_vehicles_detected: u64,
    pub total_people_detected: u64,
    /// Lane-ticks on which an emergency vehicle was seen
    pub emergency_vehicles_detected: u64,
    pub average_processing_time: f64,
    pub processing_samples: usize,
    pub uptime_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(lane_id: usize, vehicles: u32, people: u32, emergency: bool) -> LaneObservation {
        LaneObservation {
            lane_id,
            vehicle_count: vehicles,
            person_count: people,
            emergency_detected: emergency,
            rendered_frame: Vec::new(),
            detection_ran: true,
        }
    }

    #[test]
    fn test_empty_average_is_zero() {
        let stats = StatsAccumulator::new();
        let snap = stats.snapshot();
        assert_eq!(snap.average_processing_time, 0.0);
        assert_eq!(snap.processing_samples, 0);
        assert_eq!(snap.ticks, 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let mut stats = StatsAccumulator::new();
        stats.record(0.1, &[obs(0, 3, 1, false), obs(1, 2, 0, true)]);
        stats.record(
            0.3,
            &[obs(0, 1, 1, false), LaneObservation::empty(1)],
        );

        let snap = stats.snapshot();
        assert_eq!(snap.ticks, 2);
        assert_eq!(snap.total_frames_processed, 3);
        assert_eq!(snap.total_vehicles_detected, 6);
        assert_eq!(snap.total_people_detected, 2);
        assert_eq!(snap.emergency_vehicles_detected, 1);
        assert!((snap.average_processing_time - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_window_keeps_most_recent_hundred() {
        let mut stats = StatsAccumulator::new();
        for i in 0..150 {
            stats.record(i as f64, &[]);
        }

        let window: Vec<f64> = stats.processing_window().collect();
        assert_eq!(window.len(), PROCESSING_WINDOW);
        // FIFO order, oldest surviving sample first
        assert_eq!(window.first(), Some(&50.0));
        assert_eq!(window.last(), Some(&149.0));
        assert!(window.windows(2).all(|w| w[1] - w[0] == 1.0));

        let expected = (50..150).map(|i| i as f64).sum::<f64>() / 100.0;
        assert_eq!(stats.snapshot().average_processing_time, expected);
        assert_eq!(stats.snapshot().processing_samples, 100);
    }

    #[test]
    fn test_window_is_not_sorted() {
        let mut stats = StatsAccumulator::new();
        for sample in [0.5, 0.1, 0.9] {
            stats.record(sample, &[]);
        }
        let window: Vec<f64> = stats.processing_window().collect();
        assert_eq!(window, vec![0.5, 0.1, 0.9]);
    }

    #[test]
    fn test_counters_are_monotonic() {
        let mut stats = StatsAccumulator::new();
        let mut previous = stats.snapshot();
        for tick in 0..20u32 {
            stats.record(0.01, &[obs(0, tick % 3, tick % 2, tick % 5 == 0)]);
            let now = stats.snapshot();
            assert!(now.total_vehicles_detected >= previous.total_vehicles_detected);
            assert!(now.total_people_detected >= previous.total_people_detected);
            assert!(now.emergency_vehicles_detected >= previous.emergency_vehicles_detected);
            assert!(now.uptime_seconds >= previous.uptime_seconds);
            previous = now;
        }
    }
}
