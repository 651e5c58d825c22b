use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return millisecond
pub(crate) fn get_now_as_u128() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
