// src/signal/state_machine.rs
//
// Two-phase signal controller over lane pairs.
//
//   GREEN(pair i) --timer--> YELLOW(pair i) --timer--> GREEN(pair i+1)
//        ^                                                   |
//        +------------- emergency on any lane ---------------+
//
// Emergency preemption jumps straight to GREEN for the pair holding the
// emergency lane, from either phase, with no clearance yellow for the pair
// that loses the green.

use super::pairs::LanePairs;
use crate::types::LaneId;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Green,
    Yellow,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Green,
    Yellow,
    Red,
}

impl From<Phase> for LightColor {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Green => Self::Green,
            Phase::Yellow => Self::Yellow,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalState {
    pub active_pair_index: usize,
    pub phase: Phase,
    /// Seconds left in the current phase; may dip below zero until the next tick
    pub phase_remaining: f64,
    /// Emergency lane waiting to be served this tick
    pub emergency_latch: Option<LaneId>,
}

/// Durations read from the live session parameters each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseDurations {
    pub yellow: u32,
    pub emergency_priority: u32,
}

/// What, if anything, changed during one `advance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    None,
    Preempted { lane: LaneId, pair_index: usize },
    GreenToYellow { pair_index: usize },
    YellowToGreen { pair_index: usize, green_secs: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaneLight {
    pub lane_id: LaneId,
    pub color: LightColor,
    pub remaining_secs: u32,
}

pub struct SignalStateMachine {
    pairs: LanePairs,
    state: SignalState,
}

impl SignalStateMachine {
    pub fn new(pairs: LanePairs, base_green_secs: u32) -> Self {
        Self {
            pairs,
            state: SignalState {
                active_pair_index: 0,
                phase: Phase::Green,
                phase_remaining: base_green_secs as f64,
                emergency_latch: None,
            },
        }
    }

    pub fn state(&self) -> &SignalState {
        &self.state
    }

    pub fn pairs(&self) -> &LanePairs {
        &self.pairs
    }

    pub fn active_pair(&self) -> [LaneId; 2] {
        self.pairs.pair(self.state.active_pair_index)
    }

    /// Step the machine by one tick.
    ///
    /// `timings` and `emergencies` are indexed by lane id and must cover every
    /// lane. At most one transition fires per call; priority is emergency,
    /// then GREEN expiry, then YELLOW expiry.
    pub fn advance(
        &mut self,
        elapsed_secs: f64,
        timings: &[u32],
        emergencies: &[bool],
        durations: PhaseDurations,
    ) -> Transition {
        debug_assert!(elapsed_secs >= 0.0, "negative elapsed time");
        debug_assert_eq!(timings.len(), self.pairs.lane_count());
        debug_assert_eq!(emergencies.len(), self.pairs.lane_count());

        self.state.phase_remaining -= elapsed_secs.max(0.0);

        // Lowest lane id wins when several lanes report at once
        if self.state.emergency_latch.is_none() {
            self.state.emergency_latch = emergencies.iter().position(|&e| e);
        }

        if let Some(lane) = self.state.emergency_latch.take() {
            let Some(pair_index) = self.pairs.pair_of(lane) else {
                debug_assert!(false, "emergency on unknown lane {}", lane);
                return Transition::None;
            };
            self.state.active_pair_index = pair_index;
            self.state.phase = Phase::Green;
            self.state.phase_remaining = durations.emergency_priority as f64;
            warn!(
                "🚨 Emergency green for lane pair {:?} (lane {})",
                self.pairs.pair(pair_index),
                lane
            );
            return Transition::Preempted { lane, pair_index };
        }

        match self.state.phase {
            Phase::Green if self.state.phase_remaining <= 0.0 => {
                self.state.phase = Phase::Yellow;
                self.state.phase_remaining = durations.yellow as f64;
                info!(
                    "Phase transition: GREEN -> YELLOW for pair {:?}",
                    self.active_pair()
                );
                Transition::GreenToYellow {
                    pair_index: self.state.active_pair_index,
                }
            }
            Phase::Yellow if self.state.phase_remaining <= 0.0 => {
                let pair_index = (self.state.active_pair_index + 1) % self.pairs.len();
                let [a, b] = self.pairs.pair(pair_index);
                let green_secs = timings[a].max(timings[b]);

                self.state.active_pair_index = pair_index;
                self.state.phase = Phase::Green;
                self.state.phase_remaining = green_secs as f64;
                info!(
                    "Phase transition: YELLOW -> GREEN for pair {:?}, duration: {}s",
                    [a, b],
                    green_secs
                );
                Transition::YellowToGreen {
                    pair_index,
                    green_secs,
                }
            }
            _ => {
                debug!(
                    "{} for pair {:?}, {:.2}s remaining",
                    self.state.phase.as_str(),
                    self.active_pair(),
                    self.state.phase_remaining
                );
                Transition::None
            }
        }
    }

    /// Phase time left, rounded half-to-even and floored at zero.
    pub fn phase_remaining_secs(&self) -> u32 {
        self.state.phase_remaining.max(0.0).round_ties_even() as u32
    }

    /// Light for every lane: the active pair shows the phase, everyone else red.
    pub fn lights(&self) -> Vec<LaneLight> {
        let remaining = self.phase_remaining_secs();
        (0..self.pairs.lane_count())
            .map(|lane_id| {
                if self.pairs.contains(self.state.active_pair_index, lane_id) {
                    LaneLight {
                        lane_id,
                        color: self.state.phase.into(),
                        remaining_secs: remaining,
                    }
                } else {
                    LaneLight {
                        lane_id,
                        color: LightColor::Red,
                        remaining_secs: 0,
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DURATIONS: PhaseDurations = PhaseDurations {
        yellow: 2,
        emergency_priority: 30,
    };
    const NO_EMERGENCY: [bool; 4] = [false; 4];

    fn machine() -> SignalStateMachine {
        let pairs = LanePairs::new(vec![[0, 2], [1, 3]], 4).unwrap();
        SignalStateMachine::new(pairs, 6)
    }

    fn active_lanes(lights: &[LaneLight]) -> Vec<LaneId> {
        lights
            .iter()
            .filter(|l| l.color != LightColor::Red)
            .map(|l| l.lane_id)
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let sm = machine();
        assert_eq!(sm.state().phase, Phase::Green);
        assert_eq!(sm.state().active_pair_index, 0);
        assert_eq!(sm.state().phase_remaining, 6.0);
        assert_eq!(sm.state().emergency_latch, None);

        let lights = sm.lights();
        assert_eq!(lights[0].color, LightColor::Green);
        assert_eq!(lights[2].color, LightColor::Green);
        assert_eq!(lights[1].color, LightColor::Red);
        assert_eq!(lights[3].color, LightColor::Red);
        assert_eq!(lights[0].remaining_secs, 6);
        assert_eq!(lights[1].remaining_secs, 0);
    }

    #[test]
    fn test_decay_without_transition() {
        let mut sm = machine();
        let t = sm.advance(1.5, &[6; 4], &NO_EMERGENCY, DURATIONS);
        assert_eq!(t, Transition::None);
        assert_eq!(sm.state().phase, Phase::Green);
        assert!((sm.state().phase_remaining - 4.5).abs() < 1e-9);
        // 4.5 rounds to even
        assert_eq!(sm.phase_remaining_secs(), 4);
    }

    #[test]
    fn test_green_to_yellow_exactly_once() {
        let mut sm = machine();
        sm.advance(5.0, &[6; 4], &NO_EMERGENCY, DURATIONS);
        assert_eq!(sm.state().phase, Phase::Green);

        let t = sm.advance(1.0, &[6; 4], &NO_EMERGENCY, DURATIONS);
        assert_eq!(t, Transition::GreenToYellow { pair_index: 0 });
        assert_eq!(sm.state().phase, Phase::Yellow);
        assert_eq!(sm.state().phase_remaining, 2.0);

        // Still inside the yellow window: no second crossing
        let t = sm.advance(0.5, &[6; 4], &NO_EMERGENCY, DURATIONS);
        assert_eq!(t, Transition::None);
        assert_eq!(sm.state().phase, Phase::Yellow);
        assert_eq!(sm.state().active_pair_index, 0);
    }

    #[test]
    fn test_overshoot_still_yields_full_yellow() {
        let mut sm = machine();
        let t = sm.advance(20.0, &[6; 4], &NO_EMERGENCY, DURATIONS);
        assert_eq!(t, Transition::GreenToYellow { pair_index: 0 });
        assert_eq!(sm.state().phase_remaining, 2.0);
    }

    #[test]
    fn test_yellow_to_green_takes_pair_maximum() {
        // Lane 0 wants 45s (clamped), lane 2 wants base 6s
        let timings = [45, 6, 6, 6];
        let mut sm = machine();

        sm.advance(6.0, &timings, &NO_EMERGENCY, DURATIONS); // -> yellow on (0,2)
        sm.advance(2.0, &timings, &NO_EMERGENCY, DURATIONS); // -> green on (1,3)
        assert_eq!(sm.state().active_pair_index, 1);
        assert_eq!(sm.state().phase_remaining, 6.0);

        sm.advance(6.0, &timings, &NO_EMERGENCY, DURATIONS); // -> yellow on (1,3)
        let t = sm.advance(2.0, &timings, &NO_EMERGENCY, DURATIONS);
        assert_eq!(
            t,
            Transition::YellowToGreen {
                pair_index: 0,
                green_secs: 45
            }
        );
        assert_eq!(sm.active_pair(), [0, 2]);
        assert_eq!(sm.state().phase, Phase::Green);
        assert_eq!(sm.state().phase_remaining, 45.0);
    }

    #[test]
    fn test_pair_rotation_cycles_back() {
        let pairs = LanePairs::new(vec![[0, 1], [2, 3], [4, 5]], 6).unwrap();
        let mut sm = SignalStateMachine::new(pairs, 5);
        let timings = [5; 6];
        let emergencies = [false; 6];
        let start = sm.state().active_pair_index;

        let mut seen = Vec::new();
        for _ in 0..3 {
            let current = sm.state().active_pair_index;
            assert_eq!(
                sm.advance(100.0, &timings, &emergencies, DURATIONS),
                Transition::GreenToYellow {
                    pair_index: current
                }
            );
            match sm.advance(100.0, &timings, &emergencies, DURATIONS) {
                Transition::YellowToGreen { pair_index, .. } => seen.push(pair_index),
                other => panic!("expected yellow -> green, got {:?}", other),
            }
        }

        assert_eq!(seen, vec![1, 2, 0]);
        assert_eq!(sm.state().active_pair_index, start);
    }

    #[test]
    fn test_emergency_preempts_green() {
        // Pair (0,2) green with 10s left
        let pairs = LanePairs::new(vec![[0, 2], [1, 3]], 4).unwrap();
        let mut sm = SignalStateMachine::new(pairs, 12);
        sm.advance(2.0, &[6; 4], &NO_EMERGENCY, DURATIONS);
        assert_eq!(sm.state().phase, Phase::Green);
        assert_eq!(sm.phase_remaining_secs(), 10);

        let t = sm.advance(0.1, &[6, 30, 6, 6], &[false, true, false, false], DURATIONS);
        assert_eq!(
            t,
            Transition::Preempted {
                lane: 1,
                pair_index: 1
            }
        );
        assert_eq!(sm.state().phase, Phase::Green);
        assert_eq!(sm.active_pair(), [1, 3]);
        assert_eq!(sm.state().phase_remaining, 30.0);
        assert_eq!(sm.state().emergency_latch, None);

        let lights = sm.lights();
        assert_eq!(lights[0].color, LightColor::Red);
        assert_eq!(lights[2].color, LightColor::Red);
        assert_eq!(lights[1].color, LightColor::Green);
        assert_eq!(lights[3].color, LightColor::Green);
        assert_eq!(lights[1].remaining_secs, 30);
    }

    #[test]
    fn test_emergency_preempts_yellow_without_clearance() {
        let mut sm = machine();
        sm.advance(6.0, &[6; 4], &NO_EMERGENCY, DURATIONS);
        assert_eq!(sm.state().phase, Phase::Yellow);

        let t = sm.advance(0.5, &[6; 4], &[false, false, false, true], DURATIONS);
        assert_eq!(
            t,
            Transition::Preempted {
                lane: 3,
                pair_index: 1
            }
        );
        assert_eq!(sm.state().phase, Phase::Green);
        assert_eq!(sm.active_pair(), [1, 3]);
    }

    #[test]
    fn test_emergency_beats_expired_timer() {
        let mut sm = machine();
        let t = sm.advance(50.0, &[6; 4], &[true, false, false, false], DURATIONS);
        assert_eq!(
            t,
            Transition::Preempted {
                lane: 0,
                pair_index: 0
            }
        );
        assert_eq!(sm.state().phase, Phase::Green);
        assert_eq!(sm.state().phase_remaining, 30.0);
    }

    #[test]
    fn test_lowest_emergency_lane_wins() {
        let mut sm = machine();
        let t = sm.advance(0.1, &[6; 4], &[false, true, true, false], DURATIONS);
        assert_eq!(
            t,
            Transition::Preempted {
                lane: 1,
                pair_index: 1
            }
        );
    }

    #[test]
    fn test_persistent_emergency_retriggers_each_tick() {
        let mut sm = machine();
        let emergencies = [false, true, false, false];
        sm.advance(0.1, &[6; 4], &emergencies, DURATIONS);
        sm.advance(5.0, &[6; 4], &emergencies, DURATIONS);
        assert_eq!(sm.state().phase_remaining, 30.0);

        // Once it clears, the timer runs down normally
        sm.advance(5.0, &[6; 4], &NO_EMERGENCY, DURATIONS);
        assert_eq!(sm.state().phase_remaining, 25.0);
    }

    #[test]
    fn test_only_active_pair_is_lit() {
        let mut sm = machine();
        let timings = [7, 12, 9, 5];
        let mut emergencies = NO_EMERGENCY;

        for step in 0..200 {
            emergencies[step % 4] = step % 37 == 0;
            sm.advance(0.7, &timings, &emergencies, DURATIONS);
            let lights = sm.lights();
            let lit = active_lanes(&lights);

            assert_eq!(lit.len(), 2, "step {}", step);
            assert_eq!(lit, {
                let mut pair = sm.active_pair().to_vec();
                pair.sort_unstable();
                pair
            });
            for light in &lights {
                if light.color == LightColor::Red {
                    assert_eq!(light.remaining_secs, 0);
                }
            }
            emergencies = NO_EMERGENCY;
        }
    }

    #[test]
    fn test_remaining_never_negative() {
        let mut sm = machine();
        // Yellow expired on this tick's decay but phase is already past zero
        sm.advance(6.0, &[6; 4], &NO_EMERGENCY, DURATIONS);
        sm.advance(1.9, &[6; 4], &NO_EMERGENCY, DURATIONS);
        assert_eq!(sm.phase_remaining_secs(), 0);

        // Force a negative remainder directly
        sm.state.phase_remaining = -3.2;
        assert_eq!(sm.phase_remaining_secs(), 0);
        assert!(sm.lights().iter().all(|l| l.remaining_secs == 0));
    }
}
