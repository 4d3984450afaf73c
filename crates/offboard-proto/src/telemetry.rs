use serde::{Deserialize, Serialize};

/// Orientation as reported by the autopilot, ENU world / FLU body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Local pose estimate in the geographic (ENU) frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub ts_unix_ms: i64,
    pub position: [f64; 3],
    pub orientation: Quaternion,
}

/// Linear velocity in the geographic (ENU) frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocitySample {
    pub ts_unix_ms: i64,
    pub linear: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub armed: bool,
    pub mode: String,
}

impl VehicleStatus {
    pub const OFFBOARD: &'static str = "OFFBOARD";

    pub fn is_offboard(&self) -> bool {
        self.mode == Self::OFFBOARD
    }
}

impl Default for VehicleStatus {
    fn default() -> Self {
        Self { armed: false, mode: String::new() }
    }
}

/// Raw RC input, pulse widths in microseconds, channel 1 first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RcChannels {
    pub ts_unix_ms: i64,
    pub channels: Vec<u16>,
}

/// Published at the scheduler rate so other vehicles can see where we are
/// in the shared swarm frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SwarmPoint {
    pub ts_unix_ms: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
