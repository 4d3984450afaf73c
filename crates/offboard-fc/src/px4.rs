//! PX4 flight mode names as reported in HEARTBEAT.custom_mode.

const MAIN_MODES: &[(u8, &str)] = &[
    (1, "MANUAL"),
    (2, "ALTCTL"),
    (3, "POSCTL"),
    (4, "AUTO"),
    (5, "ACRO"),
    (6, "OFFBOARD"),
    (7, "STABILIZED"),
    (8, "RATTITUDE"),
];

const AUTO_SUB_MODES: &[(u8, &str)] = &[
    (1, "AUTO.READY"),
    (2, "AUTO.TAKEOFF"),
    (3, "AUTO.LOITER"),
    (4, "AUTO.MISSION"),
    (5, "AUTO.RTL"),
    (6, "AUTO.LAND"),
    (8, "AUTO.FOLLOW_TARGET"),
    (9, "AUTO.PRECLAND"),
];

const AUTO_MAIN: u8 = 4;

/// Decodes a PX4 custom_mode word (main mode in byte 2, sub mode in byte 3).
pub fn mode_name(custom_mode: u32) -> String {
    let main = ((custom_mode >> 16) & 0xff) as u8;
    let sub = ((custom_mode >> 24) & 0xff) as u8;
    if main == AUTO_MAIN {
        if let Some((_, name)) = AUTO_SUB_MODES.iter().find(|(s, _)| *s == sub) {
            return (*name).to_string();
        }
    }
    match MAIN_MODES.iter().find(|(m, _)| *m == main) {
        Some((_, name)) => (*name).to_string(),
        None => format!("CMODE({})", custom_mode),
    }
}

/// Main and sub mode numbers for a mode name, for MAV_CMD_DO_SET_MODE.
pub fn mode_numbers(name: &str) -> Option<(u8, u8)> {
    let name = name.trim().to_ascii_uppercase();
    if let Some((sub, _)) = AUTO_SUB_MODES.iter().find(|(_, n)| *n == name) {
        return Some((AUTO_MAIN, *sub));
    }
    MAIN_MODES.iter().find(|(_, n)| *n == name).map(|(m, _)| (*m, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offboard_decodes_from_main_mode_byte() {
        assert_eq!(mode_name(6 << 16), "OFFBOARD");
        assert_eq!(mode_name(3 << 16), "POSCTL");
    }

    #[test]
    fn auto_sub_modes_are_qualified() {
        assert_eq!(mode_name((4 << 16) | (6 << 24)), "AUTO.LAND");
        assert_eq!(mode_name(4 << 16), "AUTO");
    }

    #[test]
    fn unknown_modes_keep_the_raw_word() {
        assert_eq!(mode_name(42 << 16), format!("CMODE({})", 42u32 << 16));
    }

    #[test]
    fn names_map_back_to_numbers() {
        assert_eq!(mode_numbers("OFFBOARD"), Some((6, 0)));
        assert_eq!(mode_numbers("auto.land"), Some((4, 6)));
        assert_eq!(mode_numbers("HOVER"), None);
    }
}
