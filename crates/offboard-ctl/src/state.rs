use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use nalgebra::{Rotation3, Vector3};
use offboard_proto::telemetry::{PoseSample, VehicleStatus};

use crate::frames::{constrain_rad, Attitude, FrameOffsets};
use crate::mode::{ActiveCommand, ControlMode};
use crate::rc::RcState;

/// Whole-value cell shared between telemetry callbacks, the sequencer and
/// the publication loops. Reads return a copy, writes replace the value.
#[derive(Debug, Default)]
pub struct Shared<T>(Mutex<T>);

impl<T: Clone> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    pub fn load(&self) -> T {
        self.lock().clone()
    }

    pub fn store(&self, value: T) {
        *self.lock() = value;
    }

    /// Read-modify-write under one lock; readers never see a partial update.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, T> {
        // a panicked writer cannot leave a half-written value behind
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Raw pose/velocity plus the offsets they are interpreted against.
#[derive(Debug, Clone, Copy, Default)]
pub struct Kinematics {
    pub pose: Option<PoseSample>,
    pub attitude: Option<Attitude>,
    pub velocity: Option<Vector3<f64>>,
    pub offsets: FrameOffsets,
}

/// Position/velocity in all three frames, derived from one [`Kinematics`]
/// snapshot so they always agree.
#[derive(Debug, Clone, Copy)]
pub struct EstimatedState {
    pub ts_unix_ms: i64,
    pub position_geo: Vector3<f64>,
    pub position_local: Vector3<f64>,
    pub position_swarm: Vector3<f64>,
    pub velocity_geo: Option<Vector3<f64>>,
    pub velocity_local: Option<Vector3<f64>>,
    pub attitude: Attitude,
    pub yaw_local: f64,
    pub body_to_earth: Rotation3<f64>,
    pub offsets: FrameOffsets,
}

impl EstimatedState {
    pub fn height(&self) -> f64 {
        self.position_geo.z
    }

    pub fn local_to_geo(&self) -> Rotation3<f64> {
        self.offsets.local_to_geo()
    }
}

impl Kinematics {
    pub fn estimate(&self, swarm_origin: &Vector3<f64>) -> Option<EstimatedState> {
        let pose = self.pose?;
        let attitude = self.attitude?;
        let [x, y, z] = pose.position;
        let position_geo = Vector3::new(x, y, z);
        let position_local = self.offsets.geo_to_local_position(&position_geo);
        Some(EstimatedState {
            ts_unix_ms: pose.ts_unix_ms,
            position_geo,
            position_local,
            position_swarm: position_local + swarm_origin,
            velocity_geo: self.velocity,
            velocity_local: self.velocity.map(|v| self.offsets.geo_to_local_vector(&v)),
            attitude,
            yaw_local: constrain_rad(attitude.yaw - self.offsets.yaw),
            body_to_earth: attitude.body_to_earth(),
            offsets: self.offsets,
        })
    }
}

/// What the sequencer is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Idle,
    Arming,
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightPhase {
    Grounded,
    Arming,
    Offboard,
    Ascending,
    Hovering,
    Descending,
    Disarmed,
}

/// Derives the phase from the status flags, the current height and what the
/// sequencer is doing.
pub fn derive_phase(
    activity: Activity,
    status: &VehicleStatus,
    height: Option<f64>,
    airborne_height: f64,
    has_flown: bool,
) -> FlightPhase {
    match activity {
        Activity::Arming => return FlightPhase::Arming,
        Activity::Ascending => return FlightPhase::Ascending,
        Activity::Descending => return FlightPhase::Descending,
        Activity::Idle => {}
    }
    match (status.armed, status.is_offboard()) {
        (false, _) if has_flown => FlightPhase::Disarmed,
        (false, _) => FlightPhase::Grounded,
        (true, true) if height.is_some_and(|h| h > airborne_height) => FlightPhase::Hovering,
        (true, true) => FlightPhase::Offboard,
        (true, false) => FlightPhase::Arming,
    }
}

#[derive(Debug, Default)]
pub struct Readiness {
    pub pose: AtomicBool,
    pub velocity: AtomicBool,
    pub rc: AtomicBool,
}

/// Everything the telemetry callbacks write and the control side reads.
#[derive(Debug)]
pub struct VehicleState {
    pub kinematics: Shared<Kinematics>,
    pub status: Shared<VehicleStatus>,
    pub rc: Shared<RcState>,
    pub command: Shared<ActiveCommand>,
    pub activity: Shared<Activity>,
    pub ready: Readiness,
    has_flown: AtomicBool,
    swarm_origin: Vector3<f64>,
}

impl VehicleState {
    pub fn new(swarm_origin: Vector3<f64>) -> Self {
        Self {
            kinematics: Shared::default(),
            status: Shared::default(),
            rc: Shared::default(),
            command: Shared::default(),
            activity: Shared::default(),
            ready: Readiness::default(),
            has_flown: AtomicBool::new(false),
            swarm_origin,
        }
    }

    pub fn swarm_origin(&self) -> Vector3<f64> {
        self.swarm_origin
    }

    pub fn estimate(&self) -> Option<EstimatedState> {
        self.kinematics.load().estimate(&self.swarm_origin)
    }

    pub fn switch_mode(&self, mode: ControlMode) {
        self.command.update(|c| c.mode = mode);
    }

    pub fn mark_flown(&self) {
        self.has_flown.store(true, Ordering::Relaxed);
    }

    pub fn has_flown(&self) -> bool {
        self.has_flown.load(Ordering::Relaxed)
    }
}
