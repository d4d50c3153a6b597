//! C7: in-memory metrics accumulator (§4.7).
//!
//! A small struct with explicit update methods
//! (`record_success`/`record_failure`/`record_rate_limit_exceeded`), per
//! the §9 re-architecture guidance to centralize metric mutation behind
//! one interface instead of writing fields from many call sites.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ErrorRecord};

const HISTOGRAM_CUTOFFS: [f64; 5] = [0.1, 0.5, 1.0, 2.0, 5.0];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingStats {
    pub sum: f64,
    pub count: u64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    /// Cumulative counts keyed by cutoff, formatted as in §3/§8 (e.g. "0.5").
    pub buckets: HashMap<String, u64>,
}

impl Default for TimingStats {
    fn default() -> Self {
        let buckets = HISTOGRAM_CUTOFFS
            .iter()
            .map(|cutoff| (format_cutoff(*cutoff), 0))
            .collect();
        Self {
            sum: 0.0,
            count: 0,
            avg: 0.0,
            max: 0.0,
            min: f64::INFINITY,
            buckets,
        }
    }
}

fn format_cutoff(cutoff: f64) -> String {
    if cutoff.fract() == 0.0 {
        format!("{}", cutoff as i64)
    } else {
        format!("{cutoff}")
    }
}

impl TimingStats {
    fn record(&mut self, seconds: f64) {
        self.sum += seconds;
        self.count += 1;
        self.avg = self.sum / self.count as f64;
        self.max = self.max.max(seconds);
        self.min = self.min.min(seconds);

        for cutoff in HISTOGRAM_CUTOFFS {
            if seconds <= cutoff {
                *self.buckets.get_mut(&format_cutoff(cutoff)).unwrap() += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastEmailStatus {
    Success,
    Failure,
    None,
}

impl Default for LastEmailStatus {
    fn default() -> Self {
        LastEmailStatus::None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureDetails {
    pub error_count_by_recipient: HashMap<String, u64>,
    pub avg_failures_per_recipient: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub emails_total: u64,
    pub emails_successful: u64,
    pub emails_failed: u64,
    pub connection_errors: u64,
    pub rate_limit_exceeded_total: u64,
    pub total_retry_attempts: u64,
    pub successful_retries: u64,
    pub banned_recipients_count: u64,
    pub consecutive_failures: u64,
    pub email_send_duration_seconds: TimingStats,
    pub email_send_rate: f64,
    pub last_email_status: LastEmailStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_email_timestamp: Option<DateTime<Utc>>,
    pub errors_by_type: HashMap<String, u64>,
    pub recent_failures: Vec<ErrorRecord>,
    pub failure_details: FailureDetails,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            emails_total: 0,
            emails_successful: 0,
            emails_failed: 0,
            connection_errors: 0,
            rate_limit_exceeded_total: 0,
            total_retry_attempts: 0,
            successful_retries: 0,
            banned_recipients_count: 0,
            consecutive_failures: 0,
            email_send_duration_seconds: TimingStats::default(),
            email_send_rate: 0.0,
            last_email_status: LastEmailStatus::None,
            last_email_timestamp: None,
            errors_by_type: HashMap::new(),
            recent_failures: Vec::new(),
            failure_details: FailureDetails::default(),
        }
    }
}

impl Metrics {
    fn bump_send_rate(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.last_email_timestamp {
            let elapsed_minutes = (now - last).num_milliseconds() as f64 / 60_000.0;
            if elapsed_minutes > 0.0 {
                self.email_send_rate = self.emails_total as f64 / elapsed_minutes;
            }
        }
        self.last_email_timestamp = Some(now);
    }

    /// Records a successful send that took `send_time_ms` milliseconds.
    pub fn record_success(&mut self, send_time_ms: f64, now: DateTime<Utc>) {
        self.emails_total += 1;
        self.emails_successful += 1;
        self.last_email_status = LastEmailStatus::Success;
        self.consecutive_failures = 0;
        self.email_send_duration_seconds.record(send_time_ms / 1000.0);
        self.bump_send_rate(now);
    }

    /// Records a failed send, attributing it to `recipients` and `kind`.
    pub fn record_failure(
        &mut self,
        kind: ErrorKind,
        error: ErrorRecord,
        recipients: &[String],
        send_time_ms: f64,
        now: DateTime<Utc>,
    ) {
        self.emails_total += 1;
        self.emails_failed += 1;
        self.last_email_status = LastEmailStatus::Failure;
        self.email_send_duration_seconds.record(send_time_ms / 1000.0);
        self.bump_send_rate(now);

        *self.errors_by_type.entry(kind.metric_key().to_string()).or_insert(0) += 1;
        self.recent_failures.push(error);

        for recipient in recipients {
            *self
                .failure_details
                .error_count_by_recipient
                .entry(recipient.clone())
                .or_insert(0) += 1;
        }
        let total_failures: u64 = self.failure_details.error_count_by_recipient.values().sum();
        let recipient_count = self.failure_details.error_count_by_recipient.len().max(1);
        self.failure_details.avg_failures_per_recipient =
            total_failures as f64 / recipient_count as f64;
    }

    pub fn record_rate_limit_exceeded(&mut self) {
        self.rate_limit_exceeded_total += 1;
    }

    pub fn record_ban(&mut self) {
        self.banned_recipients_count += 1;
    }

    pub fn record_ban_expired(&mut self) {
        self.banned_recipients_count = self.banned_recipients_count.saturating_sub(1);
    }

    pub fn record_connection_error(&mut self) {
        self.connection_errors += 1;
        *self
            .errors_by_type
            .entry(ErrorKind::ConnectionError.metric_key().to_string())
            .or_insert(0) += 1;
        self.last_email_status = LastEmailStatus::Failure;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invariant_total_equals_success_plus_failed() {
        let mut metrics = Metrics::default();
        metrics.record_success(100.0, Utc::now());
        metrics.record_failure(
            ErrorKind::ConnectionError,
            ErrorRecord::new(crate::error::ErrorCode::Connection, "boom"),
            &["a@b.co".to_string()],
            50.0,
            Utc::now(),
        );
        assert_eq!(
            metrics.emails_total,
            metrics.emails_successful + metrics.emails_failed
        );
    }

    #[test]
    fn s7_fast_send_buckets_correctly() {
        let mut metrics = Metrics::default();
        metrics.record_success(150.0, Utc::now());
        assert_eq!(metrics.emails_successful, 1);
        assert_eq!(*metrics.email_send_duration_seconds.buckets.get("0.5").unwrap(), 1);
        assert_eq!(*metrics.email_send_duration_seconds.buckets.get("0.1").unwrap(), 0);
        assert!(matches!(metrics.last_email_status, LastEmailStatus::Success));
    }

    #[test]
    fn buckets_are_cumulative_and_monotone() {
        let mut metrics = Metrics::default();
        for ms in [50.0, 300.0, 900.0, 1800.0, 4000.0, 6000.0] {
            metrics.record_success(ms, Utc::now());
        }
        let buckets = &metrics.email_send_duration_seconds.buckets;
        assert!(buckets["0.1"] <= buckets["0.5"]);
        assert!(buckets["0.5"] <= buckets["1"]);
        assert!(buckets["1"] <= buckets["2"]);
        assert!(buckets["2"] <= buckets["5"]);
        assert!(buckets["5"] <= metrics.email_send_duration_seconds.count);
    }

    #[test]
    fn failure_ledger_tracks_per_recipient_counts() {
        let mut metrics = Metrics::default();
        for _ in 0..2 {
            metrics.record_failure(
                ErrorKind::CommandError,
                ErrorRecord::new(crate::error::ErrorCode::Command, "rejected"),
                &["a@b.co".to_string()],
                10.0,
                Utc::now(),
            );
        }
        assert_eq!(
            metrics.failure_details.error_count_by_recipient["a@b.co"],
            2
        );
        assert_eq!(metrics.failure_details.avg_failures_per_recipient, 2.0);
    }
}
