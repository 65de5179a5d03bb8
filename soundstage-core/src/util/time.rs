use chrono::Utc;

/// The wall-clock time in unix milliseconds, as carried by sync and
/// stream timestamps.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
