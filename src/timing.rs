// src/timing.rs
//
// Desired green duration for a single lane, from what the detector saw on it.

/// Inputs of the green-time formula, all in seconds or seconds per object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingParams {
    pub base_green: u32,
    pub min_green: u32,
    pub max_green: u32,
    pub vehicle_weight: f64,
    pub person_weight: f64,
    pub emergency_priority: u32,
}

/// Green time a lane would like to get.
///
/// An emergency vehicle overrides everything and yields the fixed priority
/// duration. Otherwise `base + vehicles * vehicle_weight + persons * person_weight`
/// is truncated to whole seconds and clamped to `[min_green, max_green]`.
/// Total: a misordered `min > max` resolves to `min`.
pub fn compute_green_seconds(
    vehicle_count: u32,
    person_count: u32,
    emergency_detected: bool,
    params: &TimingParams,
) -> u32 {
    if emergency_detected {
        return params.emergency_priority;
    }

    let raw = params.base_green as f64
        + vehicle_count as f64 * params.vehicle_weight
        + person_count as f64 * params.person_weight;

    // `as` saturates, so negative weights floor at 0 and huge counts at u32::MAX
    let truncated = raw.trunc() as u32;
    truncated.min(params.max_green).max(params.min_green)
}
