//! Go-to-point: a constant-speed heading controller with a stopping
//! deadband (no integral or derivative action). The target is measured
//! against the geographic position estimate.

use nalgebra::{Rotation3, Vector3};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::FlightError;
use crate::mode::ControlMode;
use crate::sequencer::OffboardController;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GotoStep {
    Arrived { distance: f64 },
    /// ENU velocity to command this cycle.
    Cruise { velocity: Vector3<f64>, distance: f64 },
}

/// One controller cycle. `current` is the geographic position; the arrow to
/// `target` is rotated by the takeoff yaw offset into the geographic frame.
pub fn goto_step(
    target: &Vector3<f64>,
    current: &Vector3<f64>,
    local_to_geo: &Rotation3<f64>,
    speed: f64,
    deadband: f64,
) -> GotoStep {
    let arrow = target - current;
    let distance = arrow.norm();
    if distance <= deadband {
        return GotoStep::Arrived { distance };
    }
    let heading = local_to_geo * arrow;
    GotoStep::Cruise { velocity: heading / heading.norm() * speed, distance }
}

impl OffboardController {
    /// Flies toward `target` at `speed` (config default when `None`) until
    /// the geographic position is within the deadband, then issues the stop
    /// command.
    pub async fn move_to_swarm_point(&self, target: Vector3<f64>, speed: Option<f64>) -> Result<(), FlightError> {
        let cfg = self.config();
        let speed = speed.unwrap_or(cfg.goto_speed);
        let timeout = cfg.goto_timeout();
        info!("goto: start x={:.2} y={:.2} z={:.2} speed={:.2}", target.x, target.y, target.z, speed);

        self.switch_mode(ControlMode::Velocity);
        let start = Instant::now();
        let res = loop {
            if self.shutdown().is_triggered() {
                break Err(FlightError::Cancelled("goto"));
            }
            let Some(est) = self.estimate() else {
                break Err(FlightError::NoPose);
            };
            match goto_step(&target, &est.position_geo, &est.local_to_geo(), speed, cfg.goto_deadband) {
                GotoStep::Arrived { distance } => {
                    info!("goto: arrived, distance={:.3}", distance);
                    break Ok(());
                }
                GotoStep::Cruise { velocity, distance } => {
                    let p = est.position_geo;
                    debug!("goto: pos=[{:.2} {:.2} {:.2}] distance={:.3}", p.x, p.y, p.z, distance);
                    self.move_by_velocity_enu(velocity.x, velocity.y, velocity.z, 0.0);
                }
            }
            if start.elapsed() >= timeout {
                break Err(FlightError::Timeout { op: "goto", after: timeout });
            }
            sleep(cfg.goto_period()).await;
        };
        self.hover();
        if let Err(e) = &res {
            warn!("goto: {}", e);
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn cruise_points_at_target_with_unit_direction() {
        let step = goto_step(
            &Vector3::new(10.0, 0.0, 0.0),
            &Vector3::zeros(),
            &Rotation3::identity(),
            1.0,
            0.5,
        );
        let GotoStep::Cruise { velocity, distance } = step else { panic!("expected cruise") };
        assert!((velocity.norm() - 1.0).abs() < 1e-12);
        assert!((velocity - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        assert_eq!(distance, 10.0);
    }

    #[test]
    fn inside_deadband_arrives() {
        let step = goto_step(
            &Vector3::new(10.0, 0.0, 0.0),
            &Vector3::new(9.6, 0.0, 0.0),
            &Rotation3::identity(),
            1.0,
            0.5,
        );
        assert!(matches!(step, GotoStep::Arrived { distance } if (distance - 0.4).abs() < 1e-9));
    }

    #[test]
    fn heading_rotated_into_geographic_frame() {
        // takeoff facing north: local +x is geographic +y
        let r = Rotation3::from_euler_angles(0.0, 0.0, FRAC_PI_2);
        let step = goto_step(&Vector3::new(4.0, 0.0, 0.0), &Vector3::zeros(), &r, 0.5, 0.5);
        let GotoStep::Cruise { velocity, .. } = step else { panic!("expected cruise") };
        assert!((velocity - Vector3::new(0.0, 0.5, 0.0)).norm() < 1e-9);
    }
}
