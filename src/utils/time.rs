use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before Unix epoch")
        .as_secs() as i64
}

pub fn is_expired(timestamp: i64, timeout: i64, current_time: i64) -> bool {
    current_time - timestamp > timeout
}
