//! Flight sequencing: telemetry ingestion, service requests, takeoff and
//! landing, and the motion intents that replace the active command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nalgebra::Vector3;
use offboard_proto::setpoint::{CommandLong, CoordFrame, LandTarget};
use offboard_proto::telemetry::{PoseSample, RcChannels, VehicleStatus, VelocitySample};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::command::{attitude_command, position_command, stop, velocity_command, Command};
use crate::error::{FlightError, LinkError};
use crate::frames::{validate_quaternion, Attitude, FrameOffsets};
use crate::link::FlightLink;
use crate::mode::{ActiveCommand, ControlMode};
use crate::publisher::Publisher;
use crate::shutdown::Shutdown;
use crate::state::{derive_phase, Activity, EstimatedState, FlightPhase, VehicleState};
use crate::ControlConfig;

pub struct OffboardController {
    cfg: ControlConfig,
    link: Arc<dyn FlightLink>,
    state: Arc<VehicleState>,
    shutdown: Shutdown,
    clamp: ClampStreak,
}

impl OffboardController {
    pub fn new(cfg: ControlConfig, link: Arc<dyn FlightLink>) -> Self {
        let [x, y, z] = cfg.swarm_origin;
        let state = Arc::new(VehicleState::new(Vector3::new(x, y, z)));
        Self { cfg, link, state, shutdown: Shutdown::new(), clamp: ClampStreak::default() }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.cfg
    }

    pub fn state(&self) -> &Arc<VehicleState> {
        &self.state
    }

    /// Triggering this stops the publication loops and aborts any polling wait.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    // ----- telemetry callbacks -----

    pub fn on_pose(&self, sample: PoseSample) -> Result<(), FlightError> {
        if sample.position.iter().any(|v| !v.is_finite()) {
            return Err(FlightError::InvalidSample("position has non-finite component"));
        }
        let orientation = validate_quaternion(&sample.orientation)?;
        let attitude = Attitude::from_quaternion(&orientation);
        let sample = PoseSample { orientation, ..sample };
        self.state.kinematics.update(|k| {
            k.pose = Some(sample);
            k.attitude = Some(attitude);
        });
        self.state.ready.pose.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn on_velocity(&self, sample: VelocitySample) -> Result<(), FlightError> {
        if sample.linear.iter().any(|v| !v.is_finite()) {
            return Err(FlightError::InvalidSample("velocity has non-finite component"));
        }
        let [vx, vy, vz] = sample.linear;
        self.state.kinematics.update(|k| k.velocity = Some(Vector3::new(vx, vy, vz)));
        self.state.ready.velocity.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn on_status(&self, status: VehicleStatus) {
        let prev = self.state.status.load();
        if prev.armed != status.armed {
            info!("vehicle {}", if status.armed { "armed" } else { "disarmed" });
        }
        if prev.mode != status.mode {
            info!("vehicle mode {} -> {}", prev.mode, status.mode);
        }
        if status.armed {
            self.state.mark_flown();
        } else {
            self.state.activity.update(|a| {
                if *a == Activity::Descending {
                    *a = Activity::Idle;
                }
            });
        }
        self.state.status.store(status);
    }

    pub fn on_rc(&self, frame: &RcChannels) {
        self.state.ready.rc.store(true, Ordering::Relaxed);
        let changed = self.state.rc.update(|rc| rc.apply(&frame.channels).then_some(*rc));
        if let Some(rc) = changed {
            info!("rc: {}", rc);
        }
    }

    /// Manual authorization from the transmitter's task switch.
    pub fn task_ready(&self) -> bool {
        self.state.rc.load().task_ready(self.cfg.task_channel)
    }

    pub fn estimate(&self) -> Option<EstimatedState> {
        self.state.estimate()
    }

    pub fn status(&self) -> VehicleStatus {
        self.state.status.load()
    }

    pub fn phase(&self) -> FlightPhase {
        derive_phase(
            self.state.activity.load(),
            &self.state.status.load(),
            self.estimate().map(|e| e.height()),
            self.cfg.airborne_height,
            self.state.has_flown(),
        )
    }

    pub async fn wait_pose_ready(&self, timeout: Duration) -> Result<EstimatedState, FlightError> {
        self.wait_for("pose", self.cfg.takeoff_poll(), timeout, |_| true).await
    }

    // ----- mode and motion intents -----

    pub fn switch_mode(&self, mode: ControlMode) {
        self.state.switch_mode(mode);
    }

    pub fn active_command(&self) -> ActiveCommand {
        self.state.command.load()
    }

    /// Replaces the active setpoint and selects velocity mode in one swap.
    pub(crate) fn issue(&self, cmd: Command) {
        let (cmd, clamped) = cmd.limited(self.cfg.max_horizontal_speed, self.cfg.max_vertical_speed);
        match self.clamp.record(clamped) {
            ClampEdge::Entered => warn!("velocity command clamped to limits: {:?}", cmd),
            ClampEdge::Held => debug!("velocity command clamped: {:?}", cmd),
            ClampEdge::Left => info!("velocity commands back within limits"),
            ClampEdge::Clear => {}
        }
        self.state.command.update(|active| *active = active.with_setpoint(cmd));
    }

    pub fn hover(&self) {
        self.issue(stop());
    }

    /// Body-frame (FLU) velocity.
    pub fn move_by_velocity_body(&self, vx: f64, vy: f64, vz: f64, yaw_rate: f64) {
        self.issue(velocity_command(vx, vy, vz, yaw_rate, CoordFrame::BodyFlu));
    }

    /// Geographic (ENU) velocity.
    pub fn move_by_velocity_enu(&self, vx: f64, vy: f64, vz: f64, yaw_rate: f64) {
        self.issue(velocity_command(vx, vy, vz, yaw_rate, CoordFrame::LocalEnu));
    }

    /// ENU position setpoint; any axis or yaw left as `None` holds its
    /// current estimated value.
    pub fn move_by_position_enu(
        &self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        yaw: Option<f64>,
    ) -> Result<(), FlightError> {
        let (x, y, z, yaw) = match (x, y, z, yaw) {
            (Some(x), Some(y), Some(z), Some(yaw)) => (x, y, z, yaw),
            _ => {
                let est = self.estimate().ok_or(FlightError::NoPose)?;
                let p = est.position_geo;
                (x.unwrap_or(p.x), y.unwrap_or(p.y), z.unwrap_or(p.z), yaw.unwrap_or(est.attitude.yaw))
            }
        };
        self.issue(position_command(x, y, z, yaw, 0.0, CoordFrame::LocalEnu));
        Ok(())
    }

    /// Hold the current position and turn to an ENU yaw.
    pub fn move_by_yaw(&self, yaw: f64) -> Result<(), FlightError> {
        self.move_by_position_enu(None, None, None, Some(yaw))
    }

    pub fn attitude_target(&self, roll: f64, pitch: f64, yaw: f64, thrust: f32) {
        let att = attitude_command(roll, pitch, yaw, thrust);
        self.state.command.update(|active| *active = active.with_attitude(att));
    }

    // ----- service requests -----

    pub async fn arm(&self) -> Result<(), FlightError> {
        acknowledge("arm", self.link.arming(true).await)
    }

    /// Arms with the autopilot's pre-arm checks bypassed.
    pub async fn force_arm(&self) -> Result<(), FlightError> {
        acknowledge("force-arm", self.link.command_long(CommandLong::force_arm()).await)
    }

    pub async fn disarm(&self) -> Result<(), FlightError> {
        acknowledge("disarm", self.link.arming(false).await)
    }

    pub async fn enter_offboard(&self) -> Result<(), FlightError> {
        acknowledge("offboard", self.link.set_mode(VehicleStatus::OFFBOARD).await)
    }

    /// Position takeoff needs offboard mode on a vehicle that is still disarmed.
    pub fn takeoff_check(&self) -> bool {
        let status = self.state.status.load();
        let mut ok = true;
        if !status.is_offboard() {
            warn!("takeoff check: not in offboard, switch to offboard manually");
            ok = false;
        }
        if status.armed {
            warn!("takeoff check: vehicle already armed, assuming it is in the air");
            ok = false;
        }
        ok
    }

    /// Velocity-ramp takeoff: capture offsets, force-arm, enter offboard, climb
    /// at `vz` until the height exceeds `height`, then stop.
    pub async fn takeoff(&self, vz: f64, height: f64) -> Result<(), FlightError> {
        self.switch_mode(ControlMode::Velocity);
        let est = self.estimate().ok_or(FlightError::NoPose)?;
        let offsets = FrameOffsets { yaw: est.attitude.yaw, position: est.position_geo };
        self.state.kinematics.update(|k| k.offsets = offsets);

        self.state.activity.store(Activity::Arming);
        if let Err(e) = self.arm_and_enter_offboard().await {
            self.state.activity.store(Activity::Idle);
            warn!("takeoff aborted: {}", e);
            return Err(e);
        }
        info!(
            "takeoff: pre-task OK, yaw_offset={:.1}deg pos_offset=[{:.2} {:.2} {:.2}]",
            offsets.yaw.to_degrees(),
            offsets.position.x,
            offsets.position.y,
            offsets.position.z,
        );

        self.issue(velocity_command(0.0, 0.0, vz, 0.0, CoordFrame::BodyFlu));
        self.state.activity.store(Activity::Ascending);
        let res = self
            .wait_for("takeoff", self.cfg.takeoff_poll(), self.cfg.takeoff_timeout(), |e| e.height() > height)
            .await;
        self.hover();
        self.state.activity.store(Activity::Idle);

        let est = res.map_err(|e| {
            warn!("takeoff failed: {}", e);
            e
        })?;
        info!("takeoff done at {:.2}m", est.height());
        Ok(())
    }

    async fn arm_and_enter_offboard(&self) -> Result<(), FlightError> {
        self.force_arm().await?;
        sleep(self.cfg.settle()).await;
        self.enter_offboard().await?;
        sleep(self.cfg.settle()).await;
        Ok(())
    }

    /// Position takeoff: requires [`takeoff_check`](Self::takeoff_check), re-anchors
    /// the takeoff frame at the current pose, arms and holds a position
    /// setpoint at `height` until it is exceeded.
    pub async fn takeoff_position(&self, height: f64) -> Result<(), FlightError> {
        if !self.takeoff_check() {
            return Err(FlightError::Precondition("takeoff check failed".into()));
        }
        self.switch_mode(ControlMode::Velocity);
        let est = self.estimate().ok_or(FlightError::NoPose)?;
        let offsets = FrameOffsets { yaw: est.attitude.yaw, position: est.position_geo };
        self.state.kinematics.update(|k| k.offsets = offsets);

        self.state.activity.store(Activity::Arming);
        if let Err(e) = self.arm().await {
            self.state.activity.store(Activity::Idle);
            return Err(e);
        }
        self.move_by_position_enu(None, None, Some(height), None)?;
        self.state.activity.store(Activity::Ascending);

        let res = self
            .wait_for(
                "takeoff_position",
                self.cfg.takeoff_pos_poll(),
                self.cfg.takeoff_timeout(),
                |e| e.height() > height,
            )
            .await;
        self.hover();
        self.state.activity.store(Activity::Idle);
        res.map(|est| info!("position takeoff done at {:.2}m", est.height()))
    }

    /// Best effort: every failure is logged and reported as `false`.
    pub async fn land(&self) -> bool {
        self.state.activity.store(Activity::Descending);
        match self.link.land(LandTarget::default()).await {
            Ok(true) => {
                info!("land accepted");
                true
            }
            Ok(false) => {
                warn!("land rejected");
                self.state.activity.store(Activity::Idle);
                false
            }
            Err(e) => {
                warn!("land error: {}", e);
                self.state.activity.store(Activity::Idle);
                false
            }
        }
    }

    pub fn start_publication(&self) -> Publisher {
        Publisher::start(&self.cfg, self.state.clone(), self.link.clone(), self.shutdown.subscribe())
    }

    /// Polls the estimate every `period` until `done` holds, the deadline
    /// passes, or shutdown is triggered.
    async fn wait_for(
        &self,
        op: &'static str,
        period: Duration,
        timeout: Duration,
        mut done: impl FnMut(&EstimatedState) -> bool,
    ) -> Result<EstimatedState, FlightError> {
        let start = Instant::now();
        loop {
            if self.shutdown.is_triggered() {
                return Err(FlightError::Cancelled(op));
            }
            if let Some(est) = self.estimate() {
                if done(&est) {
                    return Ok(est);
                }
                debug!("{}: waiting, height={:.2}", op, est.height());
            }
            if start.elapsed() >= timeout {
                return Err(FlightError::Timeout { op, after: timeout });
            }
            sleep(period).await;
        }
    }
}

fn acknowledge(op: &'static str, ack: Result<bool, LinkError>) -> Result<(), FlightError> {
    match ack {
        Ok(true) => {
            info!("{}: success", op);
            Ok(())
        }
        Ok(false) => {
            warn!("{}: rejected", op);
            Err(FlightError::Rejected(op))
        }
        Err(e) => {
            warn!("{}: request failed: {}", op, e);
            Err(e.into())
        }
    }
}

/// Consecutive clamped commands, so a run of them warns only once.
#[derive(Debug, Default)]
struct ClampStreak(AtomicBool);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClampEdge {
    Entered,
    Held,
    Left,
    Clear,
}

impl ClampStreak {
    fn record(&self, clamped: bool) -> ClampEdge {
        match (self.0.swap(clamped, Ordering::Relaxed), clamped) {
            (false, true) => ClampEdge::Entered,
            (true, true) => ClampEdge::Held,
            (true, false) => ClampEdge::Left,
            (false, false) => ClampEdge::Clear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_streak_reports_edges_once() {
        let streak = ClampStreak::default();
        let edges: Vec<_> = [false, true, true, true, false, false, true].into_iter().map(|c| streak.record(c)).collect();
        assert_eq!(
            edges,
            vec![
                ClampEdge::Clear,
                ClampEdge::Entered,
                ClampEdge::Held,
                ClampEdge::Held,
                ClampEdge::Left,
                ClampEdge::Clear,
                ClampEdge::Entered,
            ]
        );
    }
}
