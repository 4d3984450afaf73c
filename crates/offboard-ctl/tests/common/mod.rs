#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use offboard_ctl::{ControlConfig, FlightLink, LinkError, OffboardController};
use offboard_proto::setpoint::{AttitudeTarget, CommandLong, LandTarget, SetpointRaw};
use offboard_proto::telemetry::{PoseSample, Quaternion, SwarmPoint};

/// Service calls seen by the mock, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Arming(bool),
    CommandLong(CommandLong),
    Land(LandTarget),
    SetMode(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Published {
    Setpoint(SetpointRaw),
    Attitude(AttitudeTarget),
}

#[derive(Debug, Default)]
struct Recorded {
    published: Vec<Published>,
    swarm: Vec<SwarmPoint>,
    requests: Vec<Request>,
}

/// Records everything and answers requests with configurable acks.
pub struct MockLink {
    pub recorded: Mutex<Recorded>,
    pub ack_arm: bool,
    pub ack_command: bool,
    pub ack_mode: bool,
    pub land_error: bool,
    /// Setpoint publishes never complete.
    pub stall_setpoints: bool,
}

impl MockLink {
    pub fn accepting() -> Self {
        Self {
            recorded: Mutex::new(Recorded::default()),
            ack_arm: true,
            ack_command: true,
            ack_mode: true,
            land_error: false,
            stall_setpoints: false,
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.recorded.lock().unwrap().published.clone()
    }

    pub fn setpoints(&self) -> Vec<SetpointRaw> {
        self.published()
            .into_iter()
            .filter_map(|p| match p {
                Published::Setpoint(sp) => Some(sp),
                Published::Attitude(_) => None,
            })
            .collect()
    }

    pub fn swarm_points(&self) -> Vec<SwarmPoint> {
        self.recorded.lock().unwrap().swarm.clone()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.recorded.lock().unwrap().requests.clone()
    }

    pub fn clear(&self) {
        *self.recorded.lock().unwrap() = Recorded::default();
    }

    fn request(&self, req: Request) {
        self.recorded.lock().unwrap().requests.push(req);
    }
}

#[async_trait]
impl FlightLink for MockLink {
    async fn publish_setpoint(&self, setpoint: &SetpointRaw) -> Result<(), LinkError> {
        if self.stall_setpoints {
            std::future::pending::<()>().await;
        }
        self.recorded.lock().unwrap().published.push(Published::Setpoint(*setpoint));
        Ok(())
    }

    async fn publish_attitude(&self, target: &AttitudeTarget) -> Result<(), LinkError> {
        self.recorded.lock().unwrap().published.push(Published::Attitude(*target));
        Ok(())
    }

    async fn publish_swarm_position(&self, point: &SwarmPoint) -> Result<(), LinkError> {
        self.recorded.lock().unwrap().swarm.push(*point);
        Ok(())
    }

    async fn arming(&self, arm: bool) -> Result<bool, LinkError> {
        self.request(Request::Arming(arm));
        Ok(self.ack_arm)
    }

    async fn command_long(&self, cmd: CommandLong) -> Result<bool, LinkError> {
        self.request(Request::CommandLong(cmd));
        Ok(self.ack_command)
    }

    async fn land(&self, target: LandTarget) -> Result<bool, LinkError> {
        self.request(Request::Land(target));
        if self.land_error {
            return Err(LinkError::Transport("serial write failed".into()));
        }
        Ok(true)
    }

    async fn set_mode(&self, custom_mode: &str) -> Result<bool, LinkError> {
        self.request(Request::SetMode(custom_mode.to_string()));
        Ok(self.ack_mode)
    }
}

pub fn pose_at(x: f64, y: f64, z: f64) -> PoseSample {
    PoseSample { ts_unix_ms: 0, position: [x, y, z], orientation: Quaternion::IDENTITY }
}

pub fn controller(link: MockLink) -> (Arc<OffboardController>, Arc<MockLink>) {
    controller_with(ControlConfig::default(), link)
}

pub fn controller_with(cfg: ControlConfig, link: MockLink) -> (Arc<OffboardController>, Arc<MockLink>) {
    let link = Arc::new(link);
    let ctl = Arc::new(OffboardController::new(cfg, link.clone()));
    (ctl, link)
}
