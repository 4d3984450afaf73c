use async_trait::async_trait;
use offboard_proto::setpoint::{AttitudeTarget, CommandLong, LandTarget, SetpointRaw};
use offboard_proto::telemetry::SwarmPoint;

use crate::error::LinkError;

/// Boundary to the autopilot: published streams plus request/response
/// services. Request methods return the autopilot's acknowledgement;
/// `Ok(false)` is a negative ack, `Err` a transport failure.
#[async_trait]
pub trait FlightLink: Send + Sync {
    async fn publish_setpoint(&self, setpoint: &SetpointRaw) -> Result<(), LinkError>;

    async fn publish_attitude(&self, target: &AttitudeTarget) -> Result<(), LinkError>;

    async fn publish_swarm_position(&self, point: &SwarmPoint) -> Result<(), LinkError>;

    async fn arming(&self, arm: bool) -> Result<bool, LinkError>;

    async fn command_long(&self, cmd: CommandLong) -> Result<bool, LinkError>;

    async fn land(&self, target: LandTarget) -> Result<bool, LinkError>;

    /// Returns the `mode_sent` flag of the set-mode service.
    async fn set_mode(&self, custom_mode: &str) -> Result<bool, LinkError>;
}
