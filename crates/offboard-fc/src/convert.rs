//! Conversions between the controller's ENU/FLU values and PX4's NED/FRD
//! MAVLink messages.

use std::f64::consts::{FRAC_PI_2, PI};

use mavlink::common::{
    AttitudeTargetTypemask, MavCmd, MavFrame, PositionTargetTypemask, COMMAND_LONG_DATA,
    DEBUG_VECT_DATA, LOCAL_POSITION_NED_DATA, RC_CHANNELS_DATA, SET_ATTITUDE_TARGET_DATA,
    SET_POSITION_TARGET_LOCAL_NED_DATA,
};
use nalgebra::UnitQuaternion;
use offboard_ctl::frames::{constrain_rad, from_unit_quaternion, to_unit_quaternion, validate_quaternion};
use offboard_ctl::LinkError;
use offboard_proto::setpoint::{AttitudeTarget, CommandLong, CoordFrame, LandTarget, SetpointRaw};
use offboard_proto::telemetry::{PoseSample, Quaternion, RcChannels, SwarmPoint, VelocitySample};

pub const SWARM_VECT_NAME: &str = "SWARMPOS";

#[derive(Debug, Clone, Copy)]
pub struct Target {
    pub system: u8,
    pub component: u8,
}

/// Axis swap between local NED and local ENU; its own inverse.
pub fn swap_ned_enu(v: [f64; 3]) -> [f64; 3] {
    [v[1], v[0], -v[2]]
}

fn flu_to_frd(v: [f64; 3]) -> [f64; 3] {
    [v[0], -v[1], -v[2]]
}

fn ned_to_enu_rotation() -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(PI, 0.0, FRAC_PI_2)
}

fn frd_to_flu_rotation() -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(PI, 0.0, 0.0)
}

/// Aircraft attitude as reported by PX4 (FRD body in NED) to FLU body in ENU.
/// Samples that are not rotations pass through untouched so the controller
/// can reject them.
pub fn attitude_ned_to_enu(q: [f32; 4]) -> Quaternion {
    let raw = Quaternion { w: f64::from(q[0]), x: f64::from(q[1]), y: f64::from(q[2]), z: f64::from(q[3]) };
    let Ok(valid) = validate_quaternion(&raw) else {
        return raw;
    };
    let enu = ned_to_enu_rotation() * to_unit_quaternion(&valid) * frd_to_flu_rotation();
    from_unit_quaternion(&enu)
}

pub fn attitude_enu_to_ned(q: &Quaternion) -> [f32; 4] {
    let ned = ned_to_enu_rotation().inverse() * to_unit_quaternion(q) * frd_to_flu_rotation().inverse();
    [ned.w as f32, ned.i as f32, ned.j as f32, ned.k as f32]
}

pub fn enu_yaw_to_ned(yaw: f32) -> f32 {
    constrain_rad(FRAC_PI_2 - f64::from(yaw)) as f32
}

fn widen(v: [f32; 3]) -> [f64; 3] {
    v.map(f64::from)
}

fn narrow(v: [f64; 3]) -> [f32; 3] {
    v.map(|x| x as f32)
}

pub fn position_target(sp: &SetpointRaw, time_boot_ms: u32, target: Target) -> SET_POSITION_TARGET_LOCAL_NED_DATA {
    let (frame, position, velocity, accel, yaw) = match sp.coordinate_frame {
        CoordFrame::LocalEnu => (
            MavFrame::MAV_FRAME_LOCAL_NED,
            swap_ned_enu(widen(sp.position)),
            swap_ned_enu(widen(sp.velocity)),
            swap_ned_enu(widen(sp.accel_or_force)),
            enu_yaw_to_ned(sp.yaw),
        ),
        CoordFrame::BodyFlu => (
            MavFrame::MAV_FRAME_BODY_NED,
            flu_to_frd(widen(sp.position)),
            flu_to_frd(widen(sp.velocity)),
            flu_to_frd(widen(sp.accel_or_force)),
            -sp.yaw,
        ),
    };
    let [x, y, z] = narrow(position);
    let [vx, vy, vz] = narrow(velocity);
    let [afx, afy, afz] = narrow(accel);
    SET_POSITION_TARGET_LOCAL_NED_DATA {
        time_boot_ms,
        x,
        y,
        z,
        vx,
        vy,
        vz,
        afx,
        afy,
        afz,
        yaw,
        yaw_rate: -sp.yaw_rate,
        type_mask: PositionTargetTypemask::from_bits_truncate(sp.type_mask),
        target_system: target.system,
        target_component: target.component,
        coordinate_frame: frame,
    }
}

pub fn attitude_target(att: &AttitudeTarget, time_boot_ms: u32, target: Target) -> SET_ATTITUDE_TARGET_DATA {
    let [roll, pitch, yaw] = flu_to_frd(widen(att.body_rate));
    SET_ATTITUDE_TARGET_DATA {
        time_boot_ms,
        target_system: target.system,
        target_component: target.component,
        type_mask: AttitudeTargetTypemask::from_bits_truncate(att.type_mask),
        q: attitude_enu_to_ned(&att.orientation),
        body_roll_rate: roll as f32,
        body_pitch_rate: pitch as f32,
        body_yaw_rate: yaw as f32,
        thrust: att.thrust,
    }
}

fn known_command(code: u16) -> Option<MavCmd> {
    match code {
        400 => Some(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM),
        176 => Some(MavCmd::MAV_CMD_DO_SET_MODE),
        21 => Some(MavCmd::MAV_CMD_NAV_LAND),
        22 => Some(MavCmd::MAV_CMD_NAV_TAKEOFF),
        20 => Some(MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH),
        17 => Some(MavCmd::MAV_CMD_NAV_LOITER_UNLIM),
        _ => None,
    }
}

pub fn command_long(cmd: &CommandLong, target: Target) -> Result<COMMAND_LONG_DATA, LinkError> {
    let command = known_command(cmd.command)
        .ok_or_else(|| LinkError::Transport(format!("unsupported command id {}", cmd.command)))?;
    let [param1, param2, param3, param4, param5, param6, param7] = cmd.params;
    Ok(COMMAND_LONG_DATA {
        target_system: target.system,
        target_component: target.component,
        command,
        confirmation: cmd.confirmation,
        param1,
        param2,
        param3,
        param4,
        param5,
        param6,
        param7,
    })
}

pub fn arm_command(arm: bool, target: Target) -> COMMAND_LONG_DATA {
    COMMAND_LONG_DATA {
        target_system: target.system,
        target_component: target.component,
        command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
        confirmation: 0,
        param1: if arm { 1.0 } else { 0.0 },
        param2: 0.0,
        param3: 0.0,
        param4: 0.0,
        param5: 0.0,
        param6: 0.0,
        param7: 0.0,
    }
}

/// MAV_CMD_DO_SET_MODE with custom main/sub mode.
pub fn set_mode_command(main: u8, sub: u8, target: Target) -> COMMAND_LONG_DATA {
    COMMAND_LONG_DATA {
        target_system: target.system,
        target_component: target.component,
        command: MavCmd::MAV_CMD_DO_SET_MODE,
        confirmation: 0,
        param1: 1.0,
        param2: f32::from(main),
        param3: f32::from(sub),
        param4: 0.0,
        param5: 0.0,
        param6: 0.0,
        param7: 0.0,
    }
}

/// An all-zero target means "land where you are": PX4 takes NaN as current
/// position and heading.
pub fn land_command(t: &LandTarget, target: Target) -> COMMAND_LONG_DATA {
    let here = t.latitude == 0.0 && t.longitude == 0.0;
    let (lat, lon, yaw) = if here {
        (f32::NAN, f32::NAN, f32::NAN)
    } else {
        (t.latitude as f32, t.longitude as f32, t.yaw)
    };
    COMMAND_LONG_DATA {
        target_system: target.system,
        target_component: target.component,
        command: MavCmd::MAV_CMD_NAV_LAND,
        confirmation: 0,
        param1: t.min_pitch,
        param2: 0.0,
        param3: 0.0,
        param4: yaw,
        param5: lat,
        param6: lon,
        param7: if here { f32::NAN } else { t.altitude },
    }
}

pub fn swarm_vect(p: &SwarmPoint) -> DEBUG_VECT_DATA {
    let mut name = [0u8; 10];
    name[..SWARM_VECT_NAME.len()].copy_from_slice(SWARM_VECT_NAME.as_bytes());
    DEBUG_VECT_DATA {
        time_usec: (p.ts_unix_ms.max(0) as u64) * 1000,
        x: p.x as f32,
        y: p.y as f32,
        z: p.z as f32,
        name,
    }
}

pub fn pose_sample(pos: &LOCAL_POSITION_NED_DATA, orientation: Quaternion, ts_unix_ms: i64) -> PoseSample {
    PoseSample {
        ts_unix_ms,
        position: swap_ned_enu(widen([pos.x, pos.y, pos.z])),
        orientation,
    }
}

pub fn velocity_sample(pos: &LOCAL_POSITION_NED_DATA, ts_unix_ms: i64) -> VelocitySample {
    VelocitySample { ts_unix_ms, linear: swap_ned_enu(widen([pos.vx, pos.vy, pos.vz])) }
}

pub fn rc_channels(rc: &RC_CHANNELS_DATA, ts_unix_ms: i64) -> RcChannels {
    let raw = [
        rc.chan1_raw,
        rc.chan2_raw,
        rc.chan3_raw,
        rc.chan4_raw,
        rc.chan5_raw,
        rc.chan6_raw,
        rc.chan7_raw,
        rc.chan8_raw,
        rc.chan9_raw,
        rc.chan10_raw,
        rc.chan11_raw,
        rc.chan12_raw,
        rc.chan13_raw,
        rc.chan14_raw,
        rc.chan15_raw,
        rc.chan16_raw,
        rc.chan17_raw,
        rc.chan18_raw,
    ];
    let count = usize::from(rc.chancount).min(raw.len());
    RcChannels { ts_unix_ms, channels: raw[..count].to_vec() }
}
