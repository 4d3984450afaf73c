//! Frame bookkeeping: quaternion decoding and the rotations between the
//! geographic (ENU), takeoff-local and body frames.

use std::f64::consts::PI;

use nalgebra::{Rotation3, UnitQuaternion, Vector3};
use offboard_proto::telemetry::Quaternion;

use crate::error::FlightError;

const TWO_PI: f64 = 2.0 * PI;

/// Wraps an angle into (-pi, pi].
pub fn constrain_rad(angle: f64) -> f64 {
    let mut a = angle % TWO_PI;
    if a <= -PI {
        a += TWO_PI;
    } else if a > PI {
        a -= TWO_PI;
    }
    a
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    /// Aerospace ZYX decoding of a (w, x, y, z) quaternion.
    pub fn from_quaternion(q: &Quaternion) -> Self {
        let (w, x, y, z) = (q.w, q.x, q.y, q.z);
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        // clamp guards asin against rounding just past +-1
        let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        Self { roll, pitch, yaw: constrain_rad(yaw) }
    }

    /// Body-to-earth rotation, R = Rz(yaw) * Ry(pitch) * Rx(roll).
    pub fn body_to_earth(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(self.roll, self.pitch, self.yaw)
    }
}

/// Rejects orientations that cannot be a rotation and renormalizes the rest.
pub fn validate_quaternion(q: &Quaternion) -> Result<Quaternion, FlightError> {
    let parts = [q.w, q.x, q.y, q.z];
    if parts.iter().any(|v| !v.is_finite()) {
        return Err(FlightError::InvalidSample("quaternion has non-finite component"));
    }
    let norm = parts.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm < 1e-6 {
        return Err(FlightError::InvalidSample("quaternion norm is zero"));
    }
    Ok(Quaternion { w: q.w / norm, x: q.x / norm, y: q.y / norm, z: q.z / norm })
}

pub fn to_unit_quaternion(q: &Quaternion) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(q.w, q.x, q.y, q.z))
}

pub fn from_unit_quaternion(q: &UnitQuaternion<f64>) -> Quaternion {
    Quaternion { w: q.w, x: q.i, y: q.j, z: q.k }
}

/// Yaw and position captured at takeoff. The yaw-only rotation maps the
/// takeoff-local frame into the geographic frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOffsets {
    pub yaw: f64,
    pub position: Vector3<f64>,
}

impl Default for FrameOffsets {
    fn default() -> Self {
        Self { yaw: 0.0, position: Vector3::zeros() }
    }
}

impl FrameOffsets {
    pub fn local_to_geo(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(0.0, 0.0, self.yaw)
    }

    pub fn geo_to_local_position(&self, geo: &Vector3<f64>) -> Vector3<f64> {
        self.local_to_geo().transpose() * (geo - self.position)
    }

    pub fn geo_to_local_vector(&self, geo: &Vector3<f64>) -> Vector3<f64> {
        self.local_to_geo().transpose() * geo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quat_from_rpy(roll: f64, pitch: f64, yaw: f64) -> Quaternion {
        from_unit_quaternion(&UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    #[test]
    fn constrain_wraps_into_half_open_interval() {
        assert_eq!(constrain_rad(PI), PI);
        assert_eq!(constrain_rad(-PI), PI);
        assert!((constrain_rad(3.0 * PI) - PI).abs() < 1e-12);
        assert!((constrain_rad(-0.5 * PI - TWO_PI) + 0.5 * PI).abs() < 1e-12);
        assert_eq!(constrain_rad(0.25), 0.25);
    }

    #[test]
    fn yaw_stays_in_range_for_unit_quaternions() {
        let mut yaw = -4.0 * PI;
        while yaw <= 4.0 * PI {
            for &(roll, pitch) in &[(0.0, 0.0), (0.3, -0.2), (-1.0, 1.2), (2.5, 0.1)] {
                let a = Attitude::from_quaternion(&quat_from_rpy(roll, pitch, yaw));
                assert!(a.yaw > -PI && a.yaw <= PI, "yaw {} out of range", a.yaw);
            }
            yaw += 0.173;
        }
    }

    #[test]
    fn decoding_recovers_euler_angles() {
        let a = Attitude::from_quaternion(&quat_from_rpy(0.1, -0.2, 1.3));
        assert!((a.roll - 0.1).abs() < 1e-9);
        assert!((a.pitch + 0.2).abs() < 1e-9);
        assert!((a.yaw - 1.3).abs() < 1e-9);
    }

    #[test]
    fn decoding_is_continuous_away_from_wrap() {
        let base = Attitude::from_quaternion(&quat_from_rpy(0.0, 0.0, 1.0));
        let nudged = Attitude::from_quaternion(&quat_from_rpy(0.0, 0.0, 1.0 + 1e-6));
        assert!((nudged.yaw - base.yaw).abs() < 1e-5);
    }

    #[test]
    fn validate_renormalizes_and_rejects_degenerate() {
        let q = validate_quaternion(&Quaternion { w: 2.0, x: 0.0, y: 0.0, z: 0.0 }).unwrap();
        assert!((q.w - 1.0).abs() < 1e-12);
        assert!(validate_quaternion(&Quaternion { w: 0.0, x: 0.0, y: 0.0, z: 0.0 }).is_err());
        assert!(validate_quaternion(&Quaternion { w: f64::NAN, x: 0.0, y: 0.0, z: 0.0 }).is_err());
    }

    #[test]
    fn offsets_map_geo_into_takeoff_frame() {
        let offsets = FrameOffsets { yaw: PI / 2.0, position: Vector3::new(1.0, 1.0, 0.0) };
        // one metre north of takeoff is one metre forward when facing north
        let local = offsets.geo_to_local_position(&Vector3::new(1.0, 2.0, 0.5));
        assert!((local - Vector3::new(1.0, 0.0, 0.5)).norm() < 1e-9);

        let back = offsets.local_to_geo() * Vector3::new(1.0, 0.0, 0.0);
        assert!((back - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn body_to_earth_rotates_forward_axis_by_yaw() {
        let a = Attitude { roll: 0.0, pitch: 0.0, yaw: PI / 2.0 };
        let fwd = a.body_to_earth() * Vector3::new(1.0, 0.0, 0.0);
        assert!((fwd - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-9);
    }
}
