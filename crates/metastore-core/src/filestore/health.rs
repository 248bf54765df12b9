//! Filestore consumer health state machine (`spec.md` §4.G).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Disabled,
    Ok,
    Stalled,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    #[serde(rename = "lagSeconds")]
    pub lag_seconds: i64,
    #[serde(rename = "connectRetries")]
    pub connect_retries: u64,
    #[serde(rename = "processingFailures")]
    pub processing_failures: u64,
}

/// Tracks connection state, last-processed timestamp, and failure
/// counters for the filestore consumer, and derives the health status
/// table from `spec.md` §4.G on demand.
pub struct HealthTracker {
    enabled: bool,
    inline: bool,
    stall_threshold: Duration,
    connected: AtomicBool,
    last_observed_at: Mutex<Option<DateTime<Utc>>>,
    connect_retries: AtomicU64,
    processing_failures: AtomicU64,
}

impl HealthTracker {
    pub fn new(enabled: bool, inline: bool, stall_threshold: Duration) -> Self {
        HealthTracker {
            enabled,
            inline,
            stall_threshold,
            connected: AtomicBool::new(inline),
            last_observed_at: Mutex::new(None),
            connect_retries: AtomicU64::new(0),
            processing_failures: AtomicU64::new(0),
        }
    }

    pub fn record_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn record_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.connect_retries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_processed(&self, observed_at: DateTime<Utc>) {
        *self.last_observed_at.lock().expect("health mutex poisoned") = Some(observed_at);
    }

    pub fn record_failure(&self) {
        self.processing_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> HealthSnapshot {
        let connect_retries = self.connect_retries.load(Ordering::SeqCst);
        let processing_failures = self.processing_failures.load(Ordering::SeqCst);

        if !self.enabled {
            return HealthSnapshot {
                status: HealthStatus::Disabled,
                lag_seconds: 0,
                connect_retries,
                processing_failures,
            };
        }

        let connected = self.inline || self.connected.load(Ordering::SeqCst);
        if !connected {
            return HealthSnapshot {
                status: HealthStatus::Error,
                lag_seconds: 0,
                connect_retries,
                processing_failures,
            };
        }

        let last_observed = *self.last_observed_at.lock().expect("health mutex poisoned");
        let lag_seconds = last_observed
            .map(|observed| (now - observed).num_seconds().max(0))
            .unwrap_or(0);

        let status = if lag_seconds as u64 <= self.stall_threshold.as_secs() {
            HealthStatus::Ok
        } else {
            HealthStatus::Stalled
        };

        HealthSnapshot {
            status,
            lag_seconds,
            connect_retries,
            processing_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn disabled_tracker_reports_disabled_regardless_of_connection() {
        let tracker = HealthTracker::new(false, false, Duration::from_secs(60));
        tracker.record_connected();
        assert_eq!(tracker.snapshot(Utc::now()).status, HealthStatus::Disabled);
    }

    #[test]
    fn inline_mode_counts_as_connected() {
        let tracker = HealthTracker::new(true, true, Duration::from_secs(60));
        assert_eq!(tracker.snapshot(Utc::now()).status, HealthStatus::Ok);
    }

    #[test]
    fn disconnected_non_inline_reports_error() {
        let tracker = HealthTracker::new(true, false, Duration::from_secs(60));
        assert_eq!(tracker.snapshot(Utc::now()).status, HealthStatus::Error);
    }

    #[test]
    fn lag_beyond_threshold_reports_stalled() {
        let tracker = HealthTracker::new(true, true, Duration::from_secs(30));
        let now = Utc::now();
        tracker.record_processed(now - ChronoDuration::seconds(90));
        let snapshot = tracker.snapshot(now);
        assert_eq!(snapshot.status, HealthStatus::Stalled);
        assert_eq!(snapshot.lag_seconds, 90);
    }

    #[test]
    fn connect_retries_and_failures_accumulate() {
        let tracker = HealthTracker::new(true, false, Duration::from_secs(30));
        tracker.record_disconnected();
        tracker.record_disconnected();
        tracker.record_failure();
        let snapshot = tracker.snapshot(Utc::now());
        assert_eq!(snapshot.connect_retries, 2);
        assert_eq!(snapshot.processing_failures, 1);
    }
}
