//! Utility functions for the dungeon finder

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Generate a new request correlation ID
pub fn generate_request_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds elapsed between two instants, clamped at zero
pub fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_milliseconds().max(0)
}

/// Instant `timeout` after `now`, clamped to the latest representable time
pub fn deadline(now: DateTime<Utc>, timeout: std::time::Duration) -> DateTime<Utc> {
    Duration::from_std(timeout)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_request_id();
        let id2 = generate_request_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_elapsed_ms() {
        let start = current_timestamp();
        let later = start + Duration::milliseconds(1500);
        assert_eq!(elapsed_ms(start, later), 1500);
        assert_eq!(elapsed_ms(later, start), 0);
    }

    #[test]
    fn test_deadline() {
        let now = current_timestamp();
        let due = deadline(now, std::time::Duration::from_secs(45));
        assert_eq!(due, now + Duration::seconds(45));
    }

    #[test]
    fn test_deadline_clamps_huge_timeouts() {
        let now = current_timestamp();
        let due = deadline(now, std::time::Duration::from_secs(10_000_000_000_000));
        assert_eq!(due, DateTime::<Utc>::MAX_UTC);
        assert_eq!(deadline(now, std::time::Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
