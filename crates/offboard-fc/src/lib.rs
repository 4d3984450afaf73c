pub mod autodetect;
pub mod convert;
pub mod mav;
pub mod px4;
pub mod safety;
pub mod state;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::autodetect::{autodetect_fc, default_candidate_bauds, default_candidate_devs};

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Explicit mavlink connection string, e.g. "udpin:0.0.0.0:14540" for SITL.
    /// Takes precedence over the serial settings below.
    pub url: Option<String>,

    /// If true, probe candidate serial ports/bauds and pick the first that
    /// yields an autopilot HEARTBEAT.
    pub autodetect: bool,

    /// When autodetect=false and no url: fixed port config
    pub serial_dev: Option<String>,
    pub baud: Option<u32>,

    /// Autodetect candidates (paths).
    pub candidate_devs: Option<Vec<String>>,
    pub candidate_bauds: Option<Vec<u32>>,

    /// Heartbeat wait per probe attempt
    pub heartbeat_timeout_ms: Option<u64>,

    /// MAVLink ids we use (companion side)
    pub sys_id: u8,
    pub comp_id: u8,

    /// target system/component (autopilot side), 1/1 for PX4.
    pub target_sys: u8,
    pub target_comp: u8,

    /// Refuse service requests until the autopilot heartbeat has been seen
    pub require_heartbeat: bool,

    /// How long a request waits for COMMAND_ACK. Default 1.5s.
    pub ack_timeout_ms: Option<u64>,

    /// Minimum spacing between two requests of the same kind. Default 200ms.
    pub min_request_interval_ms: Option<u64>,

    /// Companion heartbeat send rate. Default 1Hz.
    pub send_heartbeat_hz: Option<f32>,
}

impl LinkConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms.unwrap_or(1500))
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms.unwrap_or(200))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.send_heartbeat_hz.unwrap_or(1.0).max(0.2))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms.unwrap_or(1500))
    }
}

pub fn serial_url(dev: &str, baud: u32) -> String {
    format!("serial:{}:{}", dev, baud)
}

/// Picks the connection string: explicit url, autodetected port, or the
/// fixed serial port.
pub fn resolve_endpoint(cfg: &LinkConfig) -> Result<String> {
    if let Some(url) = cfg.url.as_ref().filter(|u| !u.is_empty()) {
        return Ok(url.clone());
    }
    if cfg.autodetect {
        let res = autodetect_fc(
            cfg.candidate_devs.clone().unwrap_or_else(default_candidate_devs),
            cfg.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds),
            cfg.heartbeat_timeout(),
        )?;
        let (dev, baud) = res.chosen.context("link autodetect failed: no heartbeat found")?;
        info!("link: using autodetected {} @ {}", dev, baud);
        return Ok(serial_url(&dev, baud));
    }
    let dev = cfg.serial_dev.clone().context("link.serial_dev missing (autodetect=false, no url)")?;
    let baud = cfg.baud.context("link.baud missing (autodetect=false, no url)")?;
    Ok(serial_url(&dev, baud))
}
