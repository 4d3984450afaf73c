use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mavlink::common::{MavAutopilot, MavMessage};
use tracing::{info, warn};

use crate::serial_url;

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub dev: String,
    pub baud: u32,
    pub hb_seen: bool,
    pub elapsed_ms: u64,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct AutodetectResult {
    pub chosen: Option<(String, u32)>,
    pub probes: Vec<ProbeResult>,
}

pub fn default_candidate_devs() -> Vec<String> {
    vec![
        "/dev/serial0".into(),
        "/dev/ttyAMA0".into(),
        "/dev/ttyS0".into(),
        "/dev/ttyUSB0".into(),
        "/dev/ttyUSB1".into(),
        "/dev/ttyACM0".into(),
        "/dev/ttyACM1".into(),
    ]
}

pub fn default_candidate_bauds() -> Vec<u32> {
    vec![57600, 115200, 230400, 921600]
}

fn is_autopilot_heartbeat(msg: &MavMessage) -> bool {
    matches!(msg, MavMessage::HEARTBEAT(hb) if hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID)
}

/// Opens `url` and waits up to `timeout` for an autopilot heartbeat. The
/// receive runs on its own thread since a quiet port can block indefinitely.
fn probe(url: &str, timeout: Duration) -> Result<bool> {
    let conn = mavlink::connect::<MavMessage>(url).with_context(|| format!("mavlink connect {}", url))?;
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let start = Instant::now();
        while start.elapsed() < timeout {
            match conn.recv() {
                Ok((_, msg)) if is_autopilot_heartbeat(&msg) => {
                    let _ = tx.send(());
                    return;
                }
                Ok(_) => {}
                Err(_) => std::thread::sleep(Duration::from_millis(25)),
            }
        }
    });
    Ok(rx.recv_timeout(timeout).is_ok())
}

pub fn autodetect_fc(
    candidate_devs: Vec<String>,
    candidate_bauds: Vec<u32>,
    heartbeat_timeout: Duration,
) -> Result<AutodetectResult> {
    let mut probes = Vec::new();

    for dev in candidate_devs {
        if !std::path::Path::new(&dev).exists() {
            probes.push(ProbeResult { dev, baud: 0, hb_seen: false, elapsed_ms: 0, note: "missing".into() });
            continue;
        }
        for baud in &candidate_bauds {
            let start = Instant::now();
            let (hb_seen, note) = match probe(&serial_url(&dev, *baud), heartbeat_timeout) {
                Ok(true) => (true, "heartbeat".to_string()),
                Ok(false) => (false, "no heartbeat".to_string()),
                Err(e) => {
                    warn!("link autodetect probe failed dev={} baud={} err={:#}", dev, baud, e);
                    (false, format!("open/connect failed: {:#}", e))
                }
            };
            probes.push(ProbeResult {
                dev: dev.clone(),
                baud: *baud,
                hb_seen,
                elapsed_ms: start.elapsed().as_millis() as u64,
                note,
            });
            if hb_seen {
                info!("link autodetect: OK {} @ {}", dev, baud);
                return Ok(AutodetectResult { chosen: Some((dev, *baud)), probes });
            }
        }
    }

    Ok(AutodetectResult { chosen: None, probes })
}
