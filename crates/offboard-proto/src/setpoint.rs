use serde::{Deserialize, Serialize};

use crate::telemetry::Quaternion;

/// Coordinate-frame codes understood by the autopilot. The numeric values
/// are the firmware's FRAME_LOCAL_NED and FRAME_BODY_NED identifiers; the
/// bridge converts ENU/FLU to the firmware's convention on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CoordFrame {
    /// Geographic east-north-up.
    LocalEnu = 1,
    /// Body-relative forward-left-up.
    BodyFlu = 8,
}

impl CoordFrame {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::LocalEnu),
            8 => Some(Self::BodyFlu),
            _ => None,
        }
    }
}

/// Field-activity bits of a position/velocity setpoint. A set bit tells the
/// receiver to ignore that field.
pub mod type_mask {
    pub const IGNORE_PX: u16 = 1;
    pub const IGNORE_PY: u16 = 2;
    pub const IGNORE_PZ: u16 = 4;
    pub const IGNORE_VX: u16 = 8;
    pub const IGNORE_VY: u16 = 16;
    pub const IGNORE_VZ: u16 = 32;
    pub const IGNORE_AFX: u16 = 64;
    pub const IGNORE_AFY: u16 = 128;
    pub const IGNORE_AFZ: u16 = 256;
    pub const FORCE: u16 = 512;
    pub const IGNORE_YAW: u16 = 1024;
    pub const IGNORE_YAW_RATE: u16 = 2048;

    pub const IGNORE_POSITION: u16 = IGNORE_PX | IGNORE_PY | IGNORE_PZ;
    pub const IGNORE_VELOCITY: u16 = IGNORE_VX | IGNORE_VY | IGNORE_VZ;
    pub const IGNORE_ACCEL: u16 = IGNORE_AFX | IGNORE_AFY | IGNORE_AFZ;

    /// Velocity + yaw rate honored.
    pub const VELOCITY_YAW_RATE: u16 = IGNORE_POSITION | IGNORE_ACCEL | FORCE | IGNORE_YAW;
    /// Position + yaw (+ yaw rate) honored.
    pub const POSITION_YAW: u16 = IGNORE_VELOCITY | IGNORE_ACCEL | FORCE;
}

/// Bits of an attitude target mask.
pub mod attitude_mask {
    pub const IGNORE_ROLL_RATE: u8 = 1;
    pub const IGNORE_PITCH_RATE: u8 = 2;
    pub const IGNORE_YAW_RATE: u8 = 4;
    pub const IGNORE_THRUST: u8 = 64;
    pub const IGNORE_ATTITUDE: u8 = 128;

    pub const ATTITUDE_THRUST: u8 = IGNORE_ROLL_RATE | IGNORE_PITCH_RATE | IGNORE_YAW_RATE;
}

/// Raw local setpoint as published to the autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointRaw {
    pub ts_unix_ms: i64,
    pub coordinate_frame: CoordFrame,
    pub type_mask: u16,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub accel_or_force: [f32; 3],
    pub yaw: f32,
    pub yaw_rate: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttitudeTarget {
    pub ts_unix_ms: i64,
    pub type_mask: u8,
    pub orientation: Quaternion,
    pub body_rate: [f32; 3],
    pub thrust: f32,
}

/// Raw long command, used where a dedicated request does not exist
/// (for example arming with the safety checks bypassed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandLong {
    pub command: u16,
    pub confirmation: u8,
    pub params: [f32; 7],
}

impl CommandLong {
    pub const COMPONENT_ARM_DISARM: u16 = 400;
    /// Magic param2 that makes the autopilot skip its pre-arm checks.
    pub const FORCE_ARM_MAGIC: f32 = 21196.0;

    pub fn force_arm() -> Self {
        Self {
            command: Self::COMPONENT_ARM_DISARM,
            confirmation: 0,
            params: [1.0, Self::FORCE_ARM_MAGIC, 0.0, 0.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Land request. All zeros means "land where you are".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandTarget {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
    pub yaw: f32,
    pub min_pitch: f32,
}
