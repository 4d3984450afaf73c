use std::time::Duration;

use offboard_ctl::ControlConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TakeoffKind {
    /// Body-frame climb at `climb_speed` until `height`.
    Ramp,
    /// Hold the takeoff point and command the target height directly.
    Position,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionCfg {
    pub takeoff: TakeoffKind,
    pub climb_speed: f64,
    pub height: f64,
    /// Swarm-frame points visited in order after takeoff.
    pub waypoints: Vec<[f64; 3]>,
    /// Cruise speed; `[control].goto_speed` when absent.
    pub speed: Option<f64>,
    pub land: bool,
    pub wait_rc_task: bool,
    pub pose_timeout_ms: u64,
    pub rc_timeout_ms: u64,
}

impl Default for MissionCfg {
    fn default() -> Self {
        Self {
            takeoff: TakeoffKind::Ramp,
            climb_speed: 0.8,
            height: 1.5,
            waypoints: Vec::new(),
            speed: None,
            land: true,
            wait_rc_task: false,
            pose_timeout_ms: 10_000,
            rc_timeout_ms: 300_000,
        }
    }
}

impl MissionCfg {
    pub fn pose_timeout(&self) -> Duration {
        Duration::from_millis(self.pose_timeout_ms)
    }

    pub fn rc_timeout(&self) -> Duration {
        Duration::from_millis(self.rc_timeout_ms)
    }

    pub fn check(&self, control: &ControlConfig) -> Result<(), String> {
        if self.height.is_nan() || self.height <= 0.0 {
            return Err("mission.height must be > 0".into());
        }
        if self.takeoff == TakeoffKind::Ramp
            && (self.climb_speed <= 0.0 || self.climb_speed > control.max_vertical_speed)
        {
            return Err("mission.climb_speed must be in (0, control.max_vertical_speed]".into());
        }
        if let Some(speed) = self.speed {
            if speed <= 0.0 || speed > control.max_horizontal_speed {
                return Err("mission.speed must be in (0, control.max_horizontal_speed]".into());
            }
        }
        if let Some(i) = self.waypoints.iter().position(|wp| wp.iter().any(|v| !v.is_finite())) {
            return Err(format!("mission.waypoints[{}] is not finite", i));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_table_over_defaults() {
        let m: MissionCfg = toml::from_str(
            r#"
            takeoff = "position"
            height = 1.8
            waypoints = [[10.0, 0.0, 1.8], [10.0, 5.0, 1.8]]
            "#,
        )
        .unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(m.takeoff, TakeoffKind::Position);
        assert_eq!(m.waypoints.len(), 2);
        assert!(m.land);
        assert!(m.check(&ControlConfig::default()).is_ok());
    }

    #[test]
    fn climb_faster_than_vertical_limit_is_rejected() {
        let m = MissionCfg { climb_speed: 5.0, ..MissionCfg::default() };
        assert!(m.check(&ControlConfig::default()).is_err());
    }

    #[test]
    fn non_finite_waypoint_is_rejected() {
        let m = MissionCfg { waypoints: vec![[0.0, f64::NAN, 1.0]], ..MissionCfg::default() };
        assert_eq!(m.check(&ControlConfig::default()), Err("mission.waypoints[0] is not finite".to_string()));
    }
}
