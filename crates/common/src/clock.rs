//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as Unix epoch seconds.
pub fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_seconds_is_recent() {
        // 2024-01-01T00:00:00Z; anything earlier means a broken clock source.
        assert!(epoch_seconds() > 1_704_067_200);
    }
}
