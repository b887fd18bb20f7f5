// src/pipeline/snapshot.rs
//
// Everything a client needs to render one tick: per-lane counts, desired
// timings and lights, plus the global phase. Built once per tick and handed
// to the broadcaster by value; the control loop keeps no reference to it.

use crate::signal::{LaneLight, LightColor, Phase};
use crate::types::{LaneId, LaneObservation};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneSnapshot {
    pub lane_id: LaneId,
    pub vehicle_count: u32,
    pub person_count: u32,
    pub emergency_detected: bool,
    /// Desired green time for this lane
    pub timing: u32,
    pub light: LightColor,
    pub remaining_secs: u32,
    #[serde(serialize_with = "serialize_frame")]
    pub frame: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub phase: Phase,
    pub phase_remaining: u32,
    pub active_pair: [LaneId; 2],
    pub lanes: Vec<LaneSnapshot>,
    pub timestamp: DateTime<Utc>,
}

impl TickSnapshot {
    /// Zip observations, timings and lights (all in lane order) into one record.
    pub fn assemble(
        tick: u64,
        phase: Phase,
        phase_remaining: u32,
        active_pair: [LaneId; 2],
        observations: Vec<LaneObservation>,
        timings: &[u32],
        lights: &[LaneLight],
    ) -> Self {
        let lanes = observations
            .into_iter()
            .zip(timings.iter().zip(lights))
            .map(|(obs, (&timing, light))| {
                debug_assert_eq!(obs.lane_id, light.lane_id);
                LaneSnapshot {
                    lane_id: obs.lane_id,
                    vehicle_count: obs.vehicle_count,
                    person_count: obs.person_count,
                    emergency_detected: obs.emergency_detected,
                    timing,
                    light: light.color,
                    remaining_secs: light.remaining_secs,
                    frame: obs.rendered_frame,
                }
            })
            .collect();

        Self {
            tick,
            phase,
            phase_remaining,
            active_pair,
            lanes,
            timestamp: Utc::now(),
        }
    }

    pub fn lights(&self) -> Vec<LightColor> {
        self.lanes.iter().map(|l| l.light).collect()
    }
}

fn serialize_frame<S: Serializer>(frame: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(frame))
}
