use std::sync::Arc;
use std::time::Duration;

use offboard_proto::now_unix_ms;
use offboard_proto::telemetry::SwarmPoint;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::{FlightError, LinkError};
use crate::link::FlightLink;
use crate::mode::{ControlMode, Outgoing};
use crate::shutdown::{Shutdown, ShutdownSignal};
use crate::state::VehicleState;
use crate::ControlConfig;

#[derive(Debug, Clone, Copy)]
struct Cadence {
    period: Duration,
    tick: Duration,
}

/// The two fixed-rate publication loops: the active setpoint stream and the
/// swarm-frame position. Both run until [`Publisher::stop`] or the
/// controller's shutdown.
pub struct Publisher {
    stop: Shutdown,
    join_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl Publisher {
    pub fn start(
        cfg: &ControlConfig,
        state: Arc<VehicleState>,
        link: Arc<dyn FlightLink>,
        controller_shutdown: ShutdownSignal,
    ) -> Self {
        state.switch_mode(ControlMode::Velocity);
        let stop = Shutdown::new();
        let cadence = Cadence { period: cfg.publish_period(), tick: cfg.publish_tick() };

        let tasks = vec![
            tokio::spawn(command_loop(
                state.clone(),
                link.clone(),
                cadence,
                stop.subscribe(),
                controller_shutdown.clone(),
            )),
            tokio::spawn(swarm_position_loop(state, link, cadence, stop.subscribe(), controller_shutdown)),
        ];
        info!("publication started at {:.0}Hz", 1.0 / cadence.period.as_secs_f64());
        Self { stop, join_timeout: cfg.stop_join(), tasks }
    }

    /// Signals both loops and waits (bounded) for each to exit. A loop that
    /// misses the bound is aborted and the stop reports a timeout.
    pub async fn stop(self) -> Result<(), FlightError> {
        self.stop.trigger();
        let mut hung = 0;
        for mut task in self.tasks {
            match timeout(self.join_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("publication task ended abnormally: {}", e),
                Err(_) => {
                    task.abort();
                    hung += 1;
                }
            }
        }
        if hung > 0 {
            warn!("{} publication task(s) aborted after {:?}", hung, self.join_timeout);
            return Err(FlightError::Timeout { op: "publication stop", after: self.join_timeout });
        }
        info!("publication stopped");
        Ok(())
    }
}

fn running(stop: &ShutdownSignal, controller: &ShutdownSignal) -> bool {
    !stop.is_triggered() && !controller.is_triggered()
}

/// Logs the first failure of a streak at warn, the rest at debug.
struct ErrorStreak {
    what: &'static str,
    failing: bool,
}

impl ErrorStreak {
    fn new(what: &'static str) -> Self {
        Self { what, failing: false }
    }

    fn record(&mut self, res: Result<(), LinkError>) {
        match res {
            Ok(()) => {
                if self.failing {
                    info!("{} publish recovered", self.what);
                }
                self.failing = false;
            }
            Err(e) if self.failing => debug!("{} publish failed: {}", self.what, e),
            Err(e) => {
                warn!("{} publish failed: {}", self.what, e);
                self.failing = true;
            }
        }
    }
}

async fn command_loop(
    state: Arc<VehicleState>,
    link: Arc<dyn FlightLink>,
    cadence: Cadence,
    stop: ShutdownSignal,
    controller: ShutdownSignal,
) {
    let mut last = Instant::now();
    let mut setpoint_errors = ErrorStreak::new("setpoint");
    let mut attitude_errors = ErrorStreak::new("attitude");
    while running(&stop, &controller) {
        if last.elapsed() >= cadence.period {
            last = Instant::now();
            let ts = now_unix_ms();
            match state.command.load().outgoing() {
                Outgoing::Setpoint(cmd) => {
                    setpoint_errors.record(link.publish_setpoint(&cmd.to_setpoint(ts)).await)
                }
                Outgoing::Attitude(att) => {
                    attitude_errors.record(link.publish_attitude(&att.to_target(ts)).await)
                }
                Outgoing::Nothing => {}
            }
        }
        sleep(cadence.tick).await;
    }
    debug!("command loop exited");
}

async fn swarm_position_loop(
    state: Arc<VehicleState>,
    link: Arc<dyn FlightLink>,
    cadence: Cadence,
    stop: ShutdownSignal,
    controller: ShutdownSignal,
) {
    let mut last = Instant::now();
    let mut errors = ErrorStreak::new("swarm position");
    while running(&stop, &controller) {
        if last.elapsed() >= cadence.period {
            last = Instant::now();
            // before the first pose this is the configured origin
            let p = state.estimate().map_or_else(|| state.swarm_origin(), |e| e.position_swarm);
            let point = SwarmPoint { ts_unix_ms: now_unix_ms(), x: p.x, y: p.y, z: p.z };
            errors.record(link.publish_swarm_position(&point).await);
        }
        sleep(cadence.tick).await;
    }
    debug!("swarm position loop exited");
}
