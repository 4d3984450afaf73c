use crate::command::{AttitudeCommand, Command};

/// Which setpoint stream the publication loop feeds the autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    #[default]
    Velocity,
    Attitude,
}

/// The mode together with the commands it selects between. Stored as one
/// value so a mode switch and a command replacement are seen together.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActiveCommand {
    pub mode: ControlMode,
    pub setpoint: Command,
    pub attitude: Option<AttitudeCommand>,
}

/// What the publication loop sends this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outgoing {
    Setpoint(Command),
    Attitude(AttitudeCommand),
    Nothing,
}

impl ActiveCommand {
    pub fn velocity_enabled(&self) -> bool {
        self.mode == ControlMode::Velocity
    }

    pub fn attitude_enabled(&self) -> bool {
        self.mode == ControlMode::Attitude
    }

    pub fn with_setpoint(self, setpoint: Command) -> Self {
        Self { mode: ControlMode::Velocity, setpoint, ..self }
    }

    pub fn with_attitude(self, attitude: AttitudeCommand) -> Self {
        Self { mode: ControlMode::Attitude, attitude: Some(attitude), ..self }
    }

    pub fn outgoing(&self) -> Outgoing {
        match self.mode {
            ControlMode::Velocity => Outgoing::Setpoint(self.setpoint),
            // nothing to hold yet: stay silent rather than send a made-up attitude
            ControlMode::Attitude => self.attitude.map_or(Outgoing::Nothing, Outgoing::Attitude),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{attitude_command, stop, velocity_command};
    use offboard_proto::setpoint::CoordFrame;

    #[test]
    fn modes_are_exclusive() {
        let mut active = ActiveCommand::default();
        assert!(active.velocity_enabled() && !active.attitude_enabled());

        active.mode = ControlMode::Attitude;
        assert!(active.attitude_enabled() && !active.velocity_enabled());
        assert_eq!(active.outgoing(), Outgoing::Nothing);

        active.mode = ControlMode::Velocity;
        assert!(!active.attitude_enabled());
        assert_eq!(active.outgoing(), Outgoing::Setpoint(stop()));
    }

    #[test]
    fn issuing_switches_mode_with_command() {
        let att = attitude_command(0.1, 0.0, 0.0, 0.5);
        let active = ActiveCommand::default().with_attitude(att);
        assert_eq!(active.outgoing(), Outgoing::Attitude(att));

        let cmd = velocity_command(1.0, 0.0, 0.0, 0.0, CoordFrame::LocalEnu);
        let active = active.with_setpoint(cmd);
        assert_eq!(active.mode, ControlMode::Velocity);
        assert_eq!(active.outgoing(), Outgoing::Setpoint(cmd));
    }
}
