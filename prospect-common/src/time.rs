//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Season label for a graduation class, e.g. 2025 → "2024-25"
pub fn season_label(end_year: i32) -> String {
    format!("{}-{:02}", end_year.saturating_sub(1), end_year.rem_euclid(100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        // After 2000-01-01, before 2100-01-01
        assert!(timestamp.timestamp() > 946_684_800);
        assert!(timestamp.timestamp() < 4_102_444_800);
    }

    #[test]
    fn test_season_label() {
        assert_eq!(season_label(2025), "2024-25");
        assert_eq!(season_label(2000), "1999-00");
        assert_eq!(season_label(i32::MIN), format!("{}-52", i32::MIN));
    }
}
