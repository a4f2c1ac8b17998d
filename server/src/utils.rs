use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Convert a minute count into the tick clock's unit (milliseconds)
pub fn minutes_to_millis(minutes: u64) -> u64 {
    minutes.saturating_mul(60_000)
}
