//! Per-peer reconciliation watermarks.
//!
//! The watermark is what disambiguates "file is new to this peer" from
//! "file was deleted here after the peer last saw it". In-memory only: a
//! daemon restart forgets every peer, which biases reconciliation toward
//! Fetch until the next exchange.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct AccessTracker {
    watermarks: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AccessTracker {
    pub fn new() -> Self {
        AccessTracker::default()
    }

    /// Last time this peer's state was reconciled, if it ever was.
    pub fn watermark_for(&self, peer: &str) -> Option<DateTime<Utc>> {
        self.watermarks.lock().get(peer).copied()
    }

    /// Record a completed reconciliation with `peer` at `timestamp`.
    pub fn record_sync(&self, peer: &str, timestamp: DateTime<Utc>) {
        self.watermarks.lock().insert(peer.to_string(), timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unseen_peer_has_no_watermark() {
        let tracker = AccessTracker::new();
        assert!(tracker.watermark_for("nobody").is_none());
    }

    #[test]
    fn record_then_overwrite() {
        let tracker = AccessTracker::new();
        let first = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let second = Utc.timestamp_opt(1_700_000_600, 0).unwrap();

        tracker.record_sync("peer-a", first);
        assert_eq!(tracker.watermark_for("peer-a"), Some(first));

        tracker.record_sync("peer-a", second);
        assert_eq!(tracker.watermark_for("peer-a"), Some(second));
        assert!(tracker.watermark_for("peer-b").is_none());
    }
}
