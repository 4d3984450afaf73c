pub mod setpoint;
pub mod telemetry;

/// Wall-clock stamp used on every message crossing the autopilot boundary.
pub fn now_unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
