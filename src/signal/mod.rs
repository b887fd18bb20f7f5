// src/signal/mod.rs

mod pairs;
mod state_machine;

pub use pairs::LanePairs;
pub use state_machine::{
    LaneLight, LightColor, Phase, PhaseDurations, SignalState, SignalStateMachine, Transition,
};
