pub mod command;
pub mod error;
pub mod frames;
pub mod goto;
pub mod link;
pub mod mode;
pub mod publisher;
pub mod rc;
pub mod sequencer;
pub mod shutdown;
pub mod state;

pub use error::{FlightError, LinkError};
pub use link::FlightLink;
pub use sequencer::OffboardController;

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// This vehicle's takeoff point expressed in the shared swarm frame.
    pub swarm_origin: [f64; 3],

    /// Setpoint and swarm-position publication rate.
    pub publish_hz: f32,
    /// Sleep between elapsed-time checks inside the publication loops.
    pub publish_tick_ms: u64,

    /// Pause after force-arm and after entering offboard during takeoff.
    pub settle_ms: u64,
    pub takeoff_poll_ms: u64,
    pub takeoff_pos_poll_ms: u64,
    pub takeoff_timeout_ms: u64,

    pub goto_period_ms: u64,
    /// Go-to terminates once closer than this to the target.
    pub goto_deadband: f64,
    /// Default cruise speed when the caller does not give one.
    pub goto_speed: f64,
    pub goto_timeout_ms: u64,

    /// Velocity commands are scaled down to these limits before publication.
    pub max_horizontal_speed: f64,
    pub max_vertical_speed: f64,

    /// RC channel whose high position authorizes the mission.
    pub task_channel: u8,
    /// Height above which an armed offboard vehicle counts as hovering.
    pub airborne_height: f64,

    /// Bound on waiting for the publication loops to exit on stop.
    pub stop_join_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            swarm_origin: [0.0; 3],
            publish_hz: 50.0,
            publish_tick_ms: 10,
            settle_ms: 500,
            takeoff_poll_ms: 100,
            takeoff_pos_poll_ms: 10,
            takeoff_timeout_ms: 20_000,
            goto_period_ms: 20,
            goto_deadband: 0.5,
            goto_speed: 0.5,
            goto_timeout_ms: 120_000,
            max_horizontal_speed: 3.0,
            max_vertical_speed: 1.5,
            task_channel: 7,
            airborne_height: 0.3,
            stop_join_ms: 1000,
        }
    }
}

impl ControlConfig {
    pub fn publish_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.publish_hz.max(1.0)))
    }

    pub fn publish_tick(&self) -> Duration {
        Duration::from_millis(self.publish_tick_ms.max(1))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn takeoff_poll(&self) -> Duration {
        Duration::from_millis(self.takeoff_poll_ms.max(1))
    }

    pub fn takeoff_pos_poll(&self) -> Duration {
        Duration::from_millis(self.takeoff_pos_poll_ms.max(1))
    }

    pub fn takeoff_timeout(&self) -> Duration {
        Duration::from_millis(self.takeoff_timeout_ms)
    }

    pub fn goto_period(&self) -> Duration {
        Duration::from_millis(self.goto_period_ms.max(1))
    }

    pub fn goto_timeout(&self) -> Duration {
        Duration::from_millis(self.goto_timeout_ms)
    }

    pub fn stop_join(&self) -> Duration {
        Duration::from_millis(self.stop_join_ms)
    }

    pub fn check(&self) -> Result<(), String> {
        if !(1.0..=500.0).contains(&self.publish_hz) {
            return Err(format!("control.publish_hz out of range: {}", self.publish_hz));
        }
        if self.goto_deadband <= 0.0 {
            return Err("control.goto_deadband must be > 0".into());
        }
        if self.goto_speed <= 0.0 || self.goto_speed > self.max_horizontal_speed {
            return Err("control.goto_speed must be in (0, max_horizontal_speed]".into());
        }
        if self.max_vertical_speed <= 0.0 {
            return Err("control.max_vertical_speed must be > 0".into());
        }
        if !(rc::FIRST_CHANNEL..rc::FIRST_CHANNEL + rc::CHANNEL_COUNT as u8).contains(&self.task_channel) {
            return Err(format!("control.task_channel {} is not a tracked switch channel", self.task_channel));
        }
        if self.swarm_origin.iter().any(|v| !v.is_finite()) {
            return Err("control.swarm_origin must be finite".into());
        }
        Ok(())
    }
}
