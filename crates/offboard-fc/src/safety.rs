use std::time::{Duration, Instant};

use offboard_ctl::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Arming,
    Command,
    Land,
    SetMode,
}

impl RequestKind {
    pub fn name(self) -> &'static str {
        match self {
            RequestKind::Arming => "arming",
            RequestKind::Command => "command",
            RequestKind::Land => "land",
            RequestKind::SetMode => "set_mode",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Gate in front of autopilot service requests: optional heartbeat
/// requirement plus a per-kind minimum spacing.
#[derive(Debug)]
pub struct RequestGate {
    last: [Option<Instant>; 4],
    min_interval: Duration,
    require_heartbeat: bool,
}

impl RequestGate {
    pub fn new(min_interval: Duration, require_heartbeat: bool) -> Self {
        Self { last: [None; 4], min_interval, require_heartbeat }
    }

    pub fn admit(&mut self, kind: RequestKind, heartbeat_seen: bool) -> Result<(), LinkError> {
        if self.require_heartbeat && !heartbeat_seen {
            return Err(LinkError::NotConnected);
        }
        let now = Instant::now();
        if let Some(t) = self.last[kind.slot()] {
            if now.duration_since(t) < self.min_interval {
                return Err(LinkError::RateLimited(kind.name()));
            }
        }
        self.last[kind.slot()] = Some(now);
        Ok(())
    }
}
