use std::time::{Duration, Instant};

use offboard_proto::telemetry::VehicleStatus;

/// Link-level view of the autopilot, as last seen by the reader.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus {
    pub connected: bool,
    pub endpoint: Option<String>,
    pub last_heartbeat: Option<Instant>,
    pub vehicle: Option<VehicleStatus>,
    pub messages: u64,
    pub last_msg: Option<String>,
}

impl LinkStatus {
    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }

    pub fn heartbeat_seen(&self) -> bool {
        self.last_heartbeat.is_some()
    }
}
