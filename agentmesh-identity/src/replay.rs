//! Timestamp freshness checks for signed requests.
//!
//! There is no nonce cache: a captured request can be replayed for as long
//! as its timestamp stays inside [`REPLAY_WINDOW_SECS`].

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::SecurityError;

/// Maximum allowed distance between a request timestamp and now, in seconds.
pub const REPLAY_WINDOW_SECS: i64 = 60;

/// Parses an RFC 3339 timestamp.
///
/// Timestamps without an offset are read as UTC.
///
/// # Errors
///
/// Returns `SecurityError::InvalidTimestamp` if the text is not a timestamp.
pub fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, SecurityError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| SecurityError::InvalidTimestamp {
            timestamp: timestamp.to_string(),
        })
}

/// Checks a timestamp against an explicit clock.
///
/// # Errors
///
/// - `InvalidTimestamp` if the timestamp does not parse
/// - `StaleTimestamp` if it is more than the window away from `now`, in
///   either direction
pub fn check_timestamp_at(timestamp: &str, now: DateTime<Utc>) -> Result<(), SecurityError> {
    let parsed = parse_timestamp(timestamp)?;
    let skew = (now - parsed).abs();
    if skew > Duration::seconds(REPLAY_WINDOW_SECS) {
        // Whole seconds, rounded up so a rejected skew never reads as the window.
        let whole = skew.num_seconds();
        let skew_secs = whole + i64::from(skew > Duration::seconds(whole));
        return Err(SecurityError::StaleTimestamp {
            skew_secs,
            window_secs: REPLAY_WINDOW_SECS,
        });
    }
    Ok(())
}

/// Returns true if the timestamp is inside the replay window.
#[must_use]
pub fn check_timestamp(timestamp: &str) -> bool {
    check_timestamp_at(timestamp, Utc::now()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_timestamp_passes() {
        assert!(check_timestamp(&Utc::now().to_rfc3339()));
    }

    #[test]
    fn old_timestamp_is_stale() {
        let now = Utc::now();
        let old = (now - Duration::seconds(120)).to_rfc3339();
        let err = check_timestamp_at(&old, now).unwrap_err();
        assert!(err.is_stale());
    }

    #[test]
    fn future_timestamp_is_stale() {
        let now = Utc::now();
        let ahead = (now + Duration::seconds(61)).to_rfc3339();
        assert!(check_timestamp_at(&ahead, now).is_err());
    }

    #[test]
    fn window_edge_is_accepted() {
        let now = Utc::now();
        let edge = (now - Duration::seconds(60)).to_rfc3339();
        assert!(check_timestamp_at(&edge, now).is_ok());
    }

    #[test]
    fn fraction_past_the_window_is_stale() {
        let now = Utc::now();
        let late = (now - Duration::milliseconds(60_900)).to_rfc3339();
        assert_eq!(
            check_timestamp_at(&late, now),
            Err(SecurityError::StaleTimestamp {
                skew_secs: 61,
                window_secs: REPLAY_WINDOW_SECS,
            })
        );

        let ahead = (now + Duration::milliseconds(60_001)).to_rfc3339();
        assert!(check_timestamp_at(&ahead, now).is_err());
    }

    #[test]
    fn naive_timestamp_is_utc() {
        let parsed = parse_timestamp("2024-03-01T12:00:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(
            parse_timestamp("yesterday"),
            Err(SecurityError::InvalidTimestamp {
                timestamp: "yesterday".to_string()
            })
        );
    }
}
