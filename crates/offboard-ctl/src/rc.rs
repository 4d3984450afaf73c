use std::fmt;

/// First switch channel we track (1-based, as printed on the transmitter).
pub const FIRST_CHANNEL: u8 = 5;
pub const CHANNEL_COUNT: usize = 5;

/// Three-position switch level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcLevel {
    Low = 0,
    Mid = 1,
    High = 2,
}

/// Maps a pulse width (us) to a switch level. Zero (no signal) and anything
/// above 2100 yield `None`.
pub fn pwm_level(pwm: u16) -> Option<RcLevel> {
    match pwm {
        1..=1300 => Some(RcLevel::Low),
        1301..=1700 => Some(RcLevel::Mid),
        1701..=2100 => Some(RcLevel::High),
        _ => None,
    }
}

/// Levels of channels 5..=9. A channel stays `None` until a valid pulse
/// width has been seen, and keeps its last level on an out-of-range reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RcState {
    levels: [Option<RcLevel>; CHANNEL_COUNT],
}

impl RcState {
    pub fn level(&self, channel: u8) -> Option<RcLevel> {
        let idx = channel.checked_sub(FIRST_CHANNEL)? as usize;
        self.levels.get(idx).copied().flatten()
    }

    /// Applies one RC frame (raw widths, channel 1 first). Returns true if any
    /// tracked channel changed level.
    pub fn apply(&mut self, raw: &[u16]) -> bool {
        let before = self.levels;
        let start = (FIRST_CHANNEL - 1) as usize;
        for (slot, pwm) in self.levels.iter_mut().zip(raw.iter().skip(start)) {
            if let Some(level) = pwm_level(*pwm) {
                *slot = Some(level);
            }
        }
        self.levels != before
    }

    pub fn channels(&self) -> impl Iterator<Item = (u8, Option<RcLevel>)> + '_ {
        self.levels.iter().enumerate().map(|(i, l)| (FIRST_CHANNEL + i as u8, *l))
    }

    /// Manual task authorization: the switch on `channel` is in the high position.
    pub fn task_ready(&self, channel: u8) -> bool {
        self.level(channel) == Some(RcLevel::High)
    }
}

impl fmt::Display for RcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (ch, level) in self.channels() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match level {
                Some(l) => write!(f, "ch{}={}", ch, l as u8)?,
                None => write!(f, "ch{}=-", ch)?,
            }
        }
        Ok(())
    }
}
