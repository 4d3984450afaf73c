use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use mavlink::{
    common::{
        MavAutopilot, MavCmd, MavMessage, MavModeFlag, MavResult, MavState, MavType, COMMAND_LONG_DATA,
        HEARTBEAT_DATA,
    },
    MavConnection, MavHeader, Message,
};
use offboard_ctl::shutdown::ShutdownSignal;
use offboard_ctl::{FlightLink, LinkError};
use offboard_proto::now_unix_ms;
use offboard_proto::setpoint::{AttitudeTarget, CommandLong, LandTarget, SetpointRaw};
use offboard_proto::telemetry::{PoseSample, Quaternion, RcChannels, SwarmPoint, VehicleStatus, VelocitySample};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::convert::{self, Target};
use crate::px4;
use crate::safety::{RequestGate, RequestKind};
use crate::state::LinkStatus;
use crate::LinkConfig;

type Connection = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// Decoded autopilot telemetry in the controller's frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Pose(PoseSample),
    Velocity(VelocitySample),
    Status(VehicleStatus),
    Rc(RcChannels),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Ack(MavCmd, MavResult),
    Telemetry(Telemetry),
}

/// Reader-side memory between messages: a pose needs the latest attitude.
#[derive(Debug, Default)]
pub struct ReaderState {
    orientation: Option<Quaternion>,
}

/// Translates one message from the autopilot. Traffic from other systems
/// and non-autopilot heartbeats are ignored.
pub fn decode(hdr: &MavHeader, msg: &MavMessage, target_sys: u8, reader: &mut ReaderState) -> Vec<Inbound> {
    if hdr.system_id != target_sys {
        return Vec::new();
    }
    let ts = now_unix_ms();
    match msg {
        MavMessage::HEARTBEAT(hb) if hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID => {
            let status = VehicleStatus {
                armed: hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
                mode: px4::mode_name(hb.custom_mode),
            };
            vec![Inbound::Telemetry(Telemetry::Status(status))]
        }
        MavMessage::COMMAND_ACK(ack) => vec![Inbound::Ack(ack.command, ack.result)],
        MavMessage::ATTITUDE_QUATERNION(att) => {
            reader.orientation = Some(convert::attitude_ned_to_enu([att.q1, att.q2, att.q3, att.q4]));
            Vec::new()
        }
        MavMessage::LOCAL_POSITION_NED(lp) => {
            let mut out = vec![Inbound::Telemetry(Telemetry::Velocity(convert::velocity_sample(lp, ts)))];
            if let Some(q) = reader.orientation {
                out.insert(0, Inbound::Telemetry(Telemetry::Pose(convert::pose_sample(lp, q, ts))));
            }
            out
        }
        MavMessage::RC_CHANNELS(rc) => vec![Inbound::Telemetry(Telemetry::Rc(convert::rc_channels(rc, ts)))],
        _ => Vec::new(),
    }
}

async fn wait_ack(rx: &mut broadcast::Receiver<(MavCmd, MavResult)>, expected: MavCmd) -> Result<bool, LinkError> {
    loop {
        match rx.recv().await {
            Ok((_, MavResult::MAV_RESULT_IN_PROGRESS)) => continue,
            Ok((cmd, result)) if cmd == expected => return Ok(result == MavResult::MAV_RESULT_ACCEPTED),
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return Err(LinkError::NotConnected),
        }
    }
}

const RECV_QUEUE: usize = 256;

/// Blocking receive loop. Ends once the reader task has gone and the next
/// message or error comes in.
fn recv_loop(conn: Connection, tx: mpsc::Sender<(MavHeader, MavMessage)>) {
    let mut failing = false;
    loop {
        match conn.recv() {
            Ok(frame) => {
                failing = false;
                if tx.blocking_send(frame).is_err() {
                    break;
                }
            }
            Err(e) => {
                if tx.is_closed() {
                    break;
                }
                if !failing {
                    warn!("link: recv failed: {}", e);
                }
                failing = true;
                std::thread::sleep(Duration::from_millis(25));
            }
        }
    }
    debug!("link receive thread exited");
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// MAVLink connection to a PX4 autopilot implementing [`FlightLink`].
pub struct MavLink {
    conn: Connection,
    hdr: Mutex<MavHeader>,
    target: Target,
    gate: Mutex<RequestGate>,
    status: Mutex<LinkStatus>,
    acks: broadcast::Sender<(MavCmd, MavResult)>,
    ack_timeout: Duration,
    heartbeat_every: Duration,
    boot: Instant,
}

impl MavLink {
    pub fn open(cfg: &LinkConfig, url: &str) -> Result<Self> {
        if let Some((dev, baud)) = url.strip_prefix("serial:").and_then(|s| s.rsplit_once(':')) {
            // quick validate device
            let baud: u32 = baud.parse().with_context(|| format!("bad baud in {}", url))?;
            let _ = tokio_serial::new(dev, baud)
                .open_native_async()
                .with_context(|| format!("open autopilot serial device {}", dev))?;
        }
        let conn = mavlink::connect::<MavMessage>(url).with_context(|| format!("mavlink connect {}", url))?;
        info!("link: connected {}", url);

        let (acks, _) = broadcast::channel(32);
        let status = LinkStatus { connected: true, endpoint: Some(url.to_string()), ..LinkStatus::default() };
        Ok(Self {
            conn: Arc::from(conn),
            hdr: Mutex::new(MavHeader { system_id: cfg.sys_id, component_id: cfg.comp_id, sequence: 0 }),
            target: Target { system: cfg.target_sys, component: cfg.target_comp },
            gate: Mutex::new(RequestGate::new(cfg.min_request_interval(), cfg.require_heartbeat)),
            status: Mutex::new(status),
            acks,
            ack_timeout: cfg.ack_timeout(),
            heartbeat_every: cfg.heartbeat_interval(),
            boot: Instant::now(),
        })
    }

    pub fn status(&self) -> LinkStatus {
        lock(&self.status).clone()
    }

    fn time_boot_ms(&self) -> u32 {
        self.boot.elapsed().as_millis() as u32
    }

    fn send(&self, msg: &MavMessage) -> Result<(), LinkError> {
        let hdr = {
            let mut hdr = lock(&self.hdr);
            hdr.sequence = hdr.sequence.wrapping_add(1);
            *hdr
        };
        self.conn.send(&hdr, msg).map_err(|e| LinkError::Transport(e.to_string()))?;
        Ok(())
    }

    pub fn send_heartbeat(&self) -> Result<(), LinkError> {
        let hb = HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        };
        self.send(&MavMessage::HEARTBEAT(hb))
    }

    /// Sends a COMMAND_LONG and waits for its COMMAND_ACK.
    async fn request(&self, kind: RequestKind, cmd: COMMAND_LONG_DATA) -> Result<bool, LinkError> {
        let hb_seen = lock(&self.status).heartbeat_seen();
        lock(&self.gate).admit(kind, hb_seen)?;

        let mut rx = self.acks.subscribe();
        let expected = cmd.command;
        debug!("link: {} request {:?}", kind.name(), expected);
        self.send(&MavMessage::COMMAND_LONG(cmd))?;
        match tokio::time::timeout(self.ack_timeout, wait_ack(&mut rx, expected)).await {
            Ok(res) => res,
            Err(_) => Err(LinkError::AckTimeout(kind.name(), self.ack_timeout)),
        }
    }

    /// Applies one received message to the link state and returns the
    /// telemetry it carried.
    pub fn ingest(&self, hdr: &MavHeader, msg: &MavMessage, reader: &mut ReaderState) -> Vec<Telemetry> {
        {
            let mut st = lock(&self.status);
            st.messages += 1;
            st.last_msg = Some(msg.message_name().to_string());
        }
        let mut out = Vec::new();
        for item in decode(hdr, msg, self.target.system, reader) {
            match item {
                Inbound::Ack(cmd, result) => {
                    debug!("link: ack {:?} {:?}", cmd, result);
                    // no waiter is fine
                    let _ = self.acks.send((cmd, result));
                }
                Inbound::Telemetry(t) => {
                    if let Telemetry::Status(s) = &t {
                        let mut st = lock(&self.status);
                        if st.last_heartbeat.is_none() {
                            info!("link: autopilot heartbeat armed={} mode={}", s.armed, s.mode);
                        }
                        st.last_heartbeat = Some(Instant::now());
                        st.vehicle = Some(s.clone());
                    }
                    out.push(t);
                }
            }
        }
        out
    }

    /// Hands decoded telemetry to `sink` until `stop` triggers or the
    /// receive thread ends. The returned task finishes promptly on `stop`
    /// even when the endpoint is silent.
    pub fn spawn_reader<F>(self: &Arc<Self>, mut stop: ShutdownSignal, mut sink: F) -> JoinHandle<()>
    where
        F: FnMut(Telemetry) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(RECV_QUEUE);
        let conn = self.conn.clone();
        // detached: the runtime must not wait on a recv that may never return
        if let Err(e) = std::thread::Builder::new().name("mav-recv".into()).spawn(move || recv_loop(conn, tx)) {
            warn!("link: cannot start receive thread: {}", e);
        }

        let link = self.clone();
        tokio::spawn(async move {
            let mut reader = ReaderState::default();
            loop {
                tokio::select! {
                    _ = stop.triggered() => break,
                    next = rx.recv() => match next {
                        Some((hdr, msg)) => {
                            for t in link.ingest(&hdr, &msg, &mut reader) {
                                sink(t);
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("link reader exited");
        })
    }

    /// Companion heartbeat at the configured rate until `stop` triggers.
    pub fn spawn_heartbeat(self: &Arc<Self>, mut stop: ShutdownSignal) -> JoinHandle<()> {
        let link = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(link.heartbeat_every);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = link.send_heartbeat() {
                            debug!("link: heartbeat send failed: {}", e);
                        }
                    }
                    _ = stop.triggered() => break,
                }
            }
        })
    }
}

#[async_trait]
impl FlightLink for MavLink {
    async fn publish_setpoint(&self, setpoint: &SetpointRaw) -> Result<(), LinkError> {
        let data = convert::position_target(setpoint, self.time_boot_ms(), self.target);
        self.send(&MavMessage::SET_POSITION_TARGET_LOCAL_NED(data))
    }

    async fn publish_attitude(&self, target: &AttitudeTarget) -> Result<(), LinkError> {
        let data = convert::attitude_target(target, self.time_boot_ms(), self.target);
        self.send(&MavMessage::SET_ATTITUDE_TARGET(data))
    }

    async fn publish_swarm_position(&self, point: &SwarmPoint) -> Result<(), LinkError> {
        self.send(&MavMessage::DEBUG_VECT(convert::swarm_vect(point)))
    }

    async fn arming(&self, arm: bool) -> Result<bool, LinkError> {
        self.request(RequestKind::Arming, convert::arm_command(arm, self.target)).await
    }

    async fn command_long(&self, cmd: CommandLong) -> Result<bool, LinkError> {
        let data = convert::command_long(&cmd, self.target)?;
        self.request(RequestKind::Command, data).await
    }

    async fn land(&self, target: LandTarget) -> Result<bool, LinkError> {
        self.request(RequestKind::Land, convert::land_command(&target, self.target)).await
    }

    async fn set_mode(&self, custom_mode: &str) -> Result<bool, LinkError> {
        let Some((main, sub)) = px4::mode_numbers(custom_mode) else {
            warn!("link: unknown PX4 mode {:?}", custom_mode);
            return Ok(false);
        };
        self.request(RequestKind::SetMode, convert::set_mode_command(main, sub, self.target)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{ATTITUDE_QUATERNION_DATA, COMMAND_ACK_DATA, LOCAL_POSITION_NED_DATA};
    use offboard_ctl::shutdown::Shutdown;

    fn hdr(system_id: u8) -> MavHeader {
        MavHeader { system_id, component_id: 1, sequence: 0 }
    }

    fn heartbeat(autopilot: MavAutopilot, base_mode: MavModeFlag, custom_mode: u32) -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot,
            base_mode,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    fn local_position() -> MavMessage {
        MavMessage::LOCAL_POSITION_NED(LOCAL_POSITION_NED_DATA {
            time_boot_ms: 0,
            x: 0.0,
            y: 0.0,
            z: -2.0,
            vx: 0.0,
            vy: 0.0,
            vz: -0.5,
        })
    }

    #[test]
    fn autopilot_heartbeat_becomes_status() {
        let mut reader = ReaderState::default();
        let msg = heartbeat(
            MavAutopilot::MAV_AUTOPILOT_PX4,
            MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED | MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            6 << 16,
        );
        let out = decode(&hdr(1), &msg, 1, &mut reader);
        assert_eq!(
            out,
            vec![Inbound::Telemetry(Telemetry::Status(VehicleStatus { armed: true, mode: "OFFBOARD".into() }))]
        );
    }

    #[test]
    fn other_heartbeats_are_ignored() {
        let mut reader = ReaderState::default();
        let gcs = heartbeat(MavAutopilot::MAV_AUTOPILOT_INVALID, MavModeFlag::empty(), 0);
        assert!(decode(&hdr(1), &gcs, 1, &mut reader).is_empty());
        let other = heartbeat(MavAutopilot::MAV_AUTOPILOT_PX4, MavModeFlag::empty(), 0);
        assert!(decode(&hdr(7), &other, 1, &mut reader).is_empty());
    }

    #[test]
    fn pose_waits_for_attitude() {
        let mut reader = ReaderState::default();
        let before = decode(&hdr(1), &local_position(), 1, &mut reader);
        assert!(matches!(before.as_slice(), [Inbound::Telemetry(Telemetry::Velocity(_))]));

        let att = MavMessage::ATTITUDE_QUATERNION(ATTITUDE_QUATERNION_DATA {
            time_boot_ms: 0,
            q1: 1.0,
            q2: 0.0,
            q3: 0.0,
            q4: 0.0,
            rollspeed: 0.0,
            pitchspeed: 0.0,
            yawspeed: 0.0,
        });
        assert!(decode(&hdr(1), &att, 1, &mut reader).is_empty());

        let after = decode(&hdr(1), &local_position(), 1, &mut reader);
        let [Inbound::Telemetry(Telemetry::Pose(pose)), Inbound::Telemetry(Telemetry::Velocity(vel))] =
            after.as_slice()
        else {
            panic!("expected pose then velocity, got {:?}", after);
        };
        assert_eq!(pose.position, [0.0, 0.0, 2.0]);
        assert_eq!(vel.linear, [0.0, 0.0, 0.5]);
    }

    #[test]
    fn command_ack_is_forwarded() {
        let mut reader = ReaderState::default();
        let ack = MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
            command: MavCmd::MAV_CMD_DO_SET_MODE,
            result: MavResult::MAV_RESULT_DENIED,
        });
        assert_eq!(
            decode(&hdr(1), &ack, 1, &mut reader),
            vec![Inbound::Ack(MavCmd::MAV_CMD_DO_SET_MODE, MavResult::MAV_RESULT_DENIED)]
        );
    }

    #[tokio::test]
    async fn ack_wait_matches_command_and_skips_progress() {
        let (tx, mut rx) = broadcast::channel(8);
        let _ = tx.send((MavCmd::MAV_CMD_NAV_LAND, MavResult::MAV_RESULT_ACCEPTED));
        let _ = tx.send((MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, MavResult::MAV_RESULT_IN_PROGRESS));
        let _ = tx.send((MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, MavResult::MAV_RESULT_TEMPORARILY_REJECTED));
        let res = wait_ack(&mut rx, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM).await;
        assert!(matches!(res, Ok(false)));
    }

    fn loopback_config() -> LinkConfig {
        LinkConfig {
            url: None,
            autodetect: false,
            serial_dev: None,
            baud: None,
            candidate_devs: None,
            candidate_bauds: None,
            heartbeat_timeout_ms: None,
            sys_id: 1,
            comp_id: 191,
            target_sys: 1,
            target_comp: 1,
            require_heartbeat: true,
            ack_timeout_ms: None,
            min_request_interval_ms: None,
            send_heartbeat_hz: None,
        }
    }

    #[tokio::test]
    async fn reader_stops_on_a_silent_endpoint() {
        let link = Arc::new(MavLink::open(&loopback_config(), "udpin:127.0.0.1:0").unwrap());
        let stop = Shutdown::new();
        let reader = link.spawn_reader(stop.subscribe(), |_| {});
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished());

        stop.trigger();
        let joined = tokio::time::timeout(Duration::from_secs(2), reader).await;
        assert!(matches!(joined, Ok(Ok(()))), "reader still running after stop");
        assert_eq!(link.status().messages, 0);
    }

    #[tokio::test]
    async fn ack_wait_fails_when_reader_is_gone() {
        let (tx, mut rx) = broadcast::channel::<(MavCmd, MavResult)>(8);
        drop(tx);
        let res = wait_ack(&mut rx, MavCmd::MAV_CMD_NAV_LAND).await;
        assert!(matches!(res, Err(LinkError::NotConnected)));
    }
}
