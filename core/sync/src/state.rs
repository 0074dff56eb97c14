//! Sync outcome, observable status and watermark persistence format.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use budgetsync_common::Error;

/// Failure message for a request made while another one is running.
pub const ALREADY_SYNCING: &str = "Sync already in progress";
/// Failure message when the device is offline.
pub const NO_CONNECTIVITY: &str = "No internet connection";

/// Outcome of one sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub items_synced: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncResult {
    /// Successful sync of `items_synced` records finished at `completed_at`.
    pub fn success(items_synced: usize, completed_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            error_message: None,
            items_synced,
            completed_at: Some(completed_at),
        }
    }

    /// Failed sync with a human-readable reason.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            items_synced: 0,
            completed_at: None,
        }
    }

    /// Failed sync caused by `error`.
    pub fn from_error(error: &Error) -> Self {
        Self::failed(format!("Sync error: {}", error))
    }
}

/// Engine state exposed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub has_connectivity: bool,
}

impl SyncStatus {
    /// One-line status for display, relative to `now`.
    pub fn status_text(&self, now: DateTime<Utc>) -> String {
        if self.is_syncing {
            return "Syncing...".to_string();
        }
        if !self.has_connectivity {
            return "No connection".to_string();
        }
        match self.last_sync_at {
            Some(at) => format!("Last sync: {}", relative_time(now - at)),
            None => "Never synced".to_string(),
        }
    }
}

fn relative_time(diff: chrono::Duration) -> String {
    if diff.num_minutes() < 1 {
        "just now".to_string()
    } else if diff.num_minutes() < 60 {
        format!("{} min ago", diff.num_minutes())
    } else if diff.num_hours() < 24 {
        format!("{}h ago", diff.num_hours())
    } else {
        format!("{} days ago", diff.num_days())
    }
}

/// Encode a watermark for the preference store.
///
/// RFC 3339 with nanoseconds, so decoding yields the exact same instant.
pub fn encode_watermark(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a stored watermark. Unparseable values count as no watermark.
pub fn decode_watermark(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_watermark_roundtrip_is_exact() {
        let now = Utc::now();
        assert_eq!(decode_watermark(&encode_watermark(now)), Some(now));
    }

    #[test]
    fn test_decode_accepts_offsets() {
        let at = decode_watermark("2026-01-01T12:00:00+02:00").unwrap();
        assert_eq!(encode_watermark(at), "2026-01-01T10:00:00.000000000Z");
    }

    #[test]
    fn test_decode_garbage() {
        assert_eq!(decode_watermark(""), None);
        assert_eq!(decode_watermark("yesterday"), None);
    }

    #[test]
    fn test_status_text() {
        let now = Utc::now();
        let mut status = SyncStatus {
            is_syncing: false,
            last_sync_at: None,
            has_connectivity: true,
        };
        assert_eq!(status.status_text(now), "Never synced");

        status.last_sync_at = Some(now - Duration::seconds(10));
        assert_eq!(status.status_text(now), "Last sync: just now");

        status.last_sync_at = Some(now - Duration::minutes(12));
        assert_eq!(status.status_text(now), "Last sync: 12 min ago");

        status.last_sync_at = Some(now - Duration::hours(3));
        assert_eq!(status.status_text(now), "Last sync: 3h ago");

        status.last_sync_at = Some(now - Duration::days(4));
        assert_eq!(status.status_text(now), "Last sync: 4 days ago");

        status.has_connectivity = false;
        assert_eq!(status.status_text(now), "No connection");

        status.is_syncing = true;
        assert_eq!(status.status_text(now), "Syncing...");
    }

    #[test]
    fn test_result_constructors() {
        let now = Utc::now();
        let ok = SyncResult::success(4, now);
        assert!(ok.success);
        assert_eq!(ok.completed_at, Some(now));

        let failed = SyncResult::from_error(&Error::Timeout("download".to_string()));
        assert!(!failed.success);
        assert!(failed.error_message.unwrap().contains("download"));
    }
}
