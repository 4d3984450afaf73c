use nalgebra::{UnitQuaternion, Vector3};
use offboard_proto::setpoint::{attitude_mask, type_mask, AttitudeTarget, CoordFrame, SetpointRaw};

use crate::frames::from_unit_quaternion;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCommand {
    pub linear: Vector3<f64>,
    pub yaw_rate: f64,
    pub frame: CoordFrame,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionCommand {
    pub position: Vector3<f64>,
    pub yaw: f64,
    pub yaw_rate: f64,
    pub frame: CoordFrame,
}

/// A complete setpoint. Commands are built whole and replaced whole; nothing
/// mutates one after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Velocity(VelocityCommand),
    Position(PositionCommand),
}

impl Default for Command {
    /// Zero velocity, zero yaw rate, body frame: the stop command.
    fn default() -> Self {
        velocity_command(0.0, 0.0, 0.0, 0.0, CoordFrame::BodyFlu)
    }
}

pub fn stop() -> Command {
    Command::default()
}

pub fn velocity_command(vx: f64, vy: f64, vz: f64, yaw_rate: f64, frame: CoordFrame) -> Command {
    Command::Velocity(VelocityCommand { linear: Vector3::new(vx, vy, vz), yaw_rate, frame })
}

pub fn position_command(x: f64, y: f64, z: f64, yaw: f64, yaw_rate: f64, frame: CoordFrame) -> Command {
    Command::Position(PositionCommand { position: Vector3::new(x, y, z), yaw, yaw_rate, frame })
}

impl Command {
    pub fn frame(&self) -> CoordFrame {
        match self {
            Command::Velocity(v) => v.frame,
            Command::Position(p) => p.frame,
        }
    }

    pub fn type_mask(&self) -> u16 {
        match self {
            Command::Velocity(_) => type_mask::VELOCITY_YAW_RATE,
            Command::Position(_) => type_mask::POSITION_YAW,
        }
    }

    /// True for a zero-velocity, zero-yaw-rate command in any frame.
    pub fn is_stop(&self) -> bool {
        match self {
            Command::Velocity(v) => v.linear == Vector3::zeros() && v.yaw_rate == 0.0,
            Command::Position(_) => false,
        }
    }

    /// Scales a velocity command down so its horizontal and vertical speed
    /// stay within limits. Returns the command and whether it was clamped.
    pub fn limited(self, max_horizontal: f64, max_vertical: f64) -> (Command, bool) {
        let Command::Velocity(mut v) = self else {
            return (self, false);
        };
        let mut clamped = false;
        let horiz = (v.linear.x * v.linear.x + v.linear.y * v.linear.y).sqrt();
        if horiz > max_horizontal && horiz > 0.0 {
            let k = max_horizontal / horiz;
            v.linear.x *= k;
            v.linear.y *= k;
            clamped = true;
        }
        if v.linear.z.abs() > max_vertical {
            v.linear.z = max_vertical.copysign(v.linear.z);
            clamped = true;
        }
        (Command::Velocity(v), clamped)
    }

    /// Wire form. Ignored fields are sent as zero.
    pub fn to_setpoint(&self, ts_unix_ms: i64) -> SetpointRaw {
        let mut sp = SetpointRaw {
            ts_unix_ms,
            coordinate_frame: self.frame(),
            type_mask: self.type_mask(),
            position: [0.0; 3],
            velocity: [0.0; 3],
            accel_or_force: [0.0; 3],
            yaw: 0.0,
            yaw_rate: 0.0,
        };
        match self {
            Command::Velocity(v) => {
                sp.velocity = [v.linear.x as f32, v.linear.y as f32, v.linear.z as f32];
                sp.yaw_rate = v.yaw_rate as f32;
            }
            Command::Position(p) => {
                sp.position = [p.position.x as f32, p.position.y as f32, p.position.z as f32];
                sp.yaw = p.yaw as f32;
                sp.yaw_rate = p.yaw_rate as f32;
            }
        }
        sp
    }
}

/// Attitude + collective thrust, body rates ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeCommand {
    pub orientation: UnitQuaternion<f64>,
    pub thrust: f32,
}

pub fn attitude_command(roll: f64, pitch: f64, yaw: f64, thrust: f32) -> AttitudeCommand {
    AttitudeCommand {
        orientation: UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        thrust: thrust.clamp(0.0, 1.0),
    }
}

impl AttitudeCommand {
    pub fn to_target(&self, ts_unix_ms: i64) -> AttitudeTarget {
        AttitudeTarget {
            ts_unix_ms,
            type_mask: attitude_mask::ATTITUDE_THRUST,
            orientation: from_unit_quaternion(&self.orientation),
            body_rate: [0.0; 3],
            thrust: self.thrust,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_canonical_stop() {
        let sp = Command::default().to_setpoint(0);
        assert_eq!(sp.velocity, [0.0; 3]);
        assert_eq!(sp.yaw_rate, 0.0);
        assert_eq!(sp.coordinate_frame, CoordFrame::BodyFlu);
        assert_eq!(sp.type_mask & type_mask::IGNORE_POSITION, type_mask::IGNORE_POSITION);
        assert_eq!(sp.type_mask & type_mask::IGNORE_ACCEL, type_mask::IGNORE_ACCEL);
        assert_ne!(sp.type_mask & type_mask::IGNORE_YAW, 0);
        assert_eq!(stop(), stop());
        assert!(stop().is_stop());
        assert!(velocity_command(0.0, 0.0, 0.0, 0.0, CoordFrame::LocalEnu).is_stop());
    }

    #[test]
    fn frame_tag_follows_request() {
        assert_eq!(velocity_command(1.0, 0.0, 0.0, 0.0, CoordFrame::LocalEnu).frame(), CoordFrame::LocalEnu);
        assert_eq!(velocity_command(1.0, 0.0, 0.0, 0.0, CoordFrame::BodyFlu).frame(), CoordFrame::BodyFlu);
    }

    #[test]
    fn no_fields_leak_between_variants() {
        let a = velocity_command(1.0, 2.0, 3.0, 0.4, CoordFrame::LocalEnu).to_setpoint(1);
        let p = position_command(5.0, 6.0, 7.0, 1.0, 0.2, CoordFrame::LocalEnu).to_setpoint(2);
        let b = velocity_command(1.0, 2.0, 3.0, 0.4, CoordFrame::LocalEnu).to_setpoint(1);
        assert_eq!(a, b);
        assert_eq!(b.position, [0.0; 3]);
        assert_eq!(b.yaw, 0.0);
        assert_eq!(p.velocity, [0.0; 3]);
        assert_eq!(p.type_mask, type_mask::POSITION_YAW);
        assert_eq!(p.position, [5.0, 6.0, 7.0]);
    }

    #[test]
    fn limit_scales_horizontal_and_caps_vertical() {
        let (c, clamped) = velocity_command(3.0, 4.0, -5.0, 0.0, CoordFrame::LocalEnu).limited(2.5, 1.0);
        assert!(clamped);
        let Command::Velocity(v) = c else { panic!("expected velocity") };
        assert!((v.linear.x - 1.5).abs() < 1e-9);
        assert!((v.linear.y - 2.0).abs() < 1e-9);
        assert_eq!(v.linear.z, -1.0);

        let (c, clamped) = velocity_command(0.5, 0.0, 0.5, 0.0, CoordFrame::BodyFlu).limited(2.5, 1.0);
        assert!(!clamped);
        assert_eq!(c, velocity_command(0.5, 0.0, 0.5, 0.0, CoordFrame::BodyFlu));
    }

    #[test]
    fn attitude_target_ignores_rates() {
        let t = attitude_command(0.0, 0.0, 0.0, 1.7).to_target(0);
        assert_eq!(t.thrust, 1.0);
        assert_eq!(t.type_mask, attitude_mask::ATTITUDE_THRUST);
        assert!((t.orientation.w - 1.0).abs() < 1e-12);
    }
}
