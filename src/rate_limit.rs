//! C6: per-recipient rate limiting and abuse control (§4.6).
//!
//! Pure logic over a `HashMap<String, RecipientLimitState>`, driven by a
//! caller-supplied timestamp so the burst/rapid-attempt/ban machinery is
//! deterministically testable without sleeping. The facade (C10) is what
//! actually shares one controller across calls behind a mutex (§5).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::RateLimitConfig;
use crate::error::{ErrorCode, ErrorRecord};

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Per-recipient bookkeeping (§3 `RecipientLimitState`).
#[derive(Debug, Clone, Default)]
pub struct RecipientLimitState {
    pub count: u32,
    pub last_reset: u64,
    pub banned: bool,
    pub ban_expiry: u64,
    pub consecutive_failures: u32,
    pub last_failure: u64,
    pub rapid_attempts: u32,
    pub last_attempt: u64,
}

/// The outcome of a single admission check, distinct enough for the
/// facade to map onto both an [`ErrorRecord`] and a metrics update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Admitted,
    /// Admitted, but only after this call found and cleared an expired
    /// ban on `recipient` — distinct from a plain `Admitted` so the
    /// caller can decrement `banned_recipients_count` (§3: "decremented
    /// on each expiry-clear").
    AdmittedAfterBanExpired,
    RapidAttemptsBanned,
    ActivelyBanned,
    ConsecutiveFailureBanned,
    BurstExceeded,
}

impl RateLimitOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(
            self,
            RateLimitOutcome::Admitted | RateLimitOutcome::AdmittedAfterBanExpired
        )
    }

    /// Whether this outcome represents a *new* ban transition (used to
    /// increment `banned_recipients_count`).
    pub fn is_new_ban(&self) -> bool {
        matches!(
            self,
            RateLimitOutcome::RapidAttemptsBanned | RateLimitOutcome::ConsecutiveFailureBanned
        )
    }

    /// Whether this outcome represents an expired ban being cleared
    /// (used to decrement `banned_recipients_count`).
    pub fn is_ban_cleared(&self) -> bool {
        matches!(self, RateLimitOutcome::AdmittedAfterBanExpired)
    }

    pub fn message(&self) -> &'static str {
        match self {
            RateLimitOutcome::Admitted | RateLimitOutcome::AdmittedAfterBanExpired => "admitted",
            RateLimitOutcome::RapidAttemptsBanned => "Too many rapid sending attempts",
            RateLimitOutcome::ActivelyBanned => "Recipient is temporarily banned",
            RateLimitOutcome::ConsecutiveFailureBanned => "Recipient is temporarily banned",
            RateLimitOutcome::BurstExceeded => "Rate limit exceeded for recipient",
        }
    }
}

/// The C6 controller. An [`RateLimitConfig`] snapshot plus the
/// per-recipient map (§3's "created on first sighting, never evicted
/// during process lifetime", unless `max_tracked_recipients` is set).
pub struct RateLimitController {
    config: RateLimitConfig,
    recipients: HashMap<String, RecipientLimitState>,
    banned_recipients_count: u64,
}

impl RateLimitController {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            recipients: HashMap::new(),
            banned_recipients_count: 0,
        }
    }

    pub fn banned_recipients_count(&self) -> u64 {
        self.banned_recipients_count
    }

    fn evict_if_needed(&mut self) {
        let Some(cap) = self.config.max_tracked_recipients else {
            return;
        };
        while self.recipients.len() > cap {
            if let Some(lru_key) = self
                .recipients
                .iter()
                .min_by_key(|(_, state)| state.last_attempt)
                .map(|(key, _)| key.clone())
            {
                self.recipients.remove(&lru_key);
            } else {
                break;
            }
        }
    }

    /// Runs the full admission sequence from §4.6 steps 1-7 for
    /// `recipient` at time `now`.
    pub fn check(&mut self, recipient: &str, now: u64) -> RateLimitOutcome {
        let config = self.config.clone();
        let mut ban_just_cleared = false;
        let state = self.recipients.entry(recipient.to_string()).or_default();

        // 2. rapid-attempt check
        if state.last_attempt != 0 && now.saturating_sub(state.last_attempt) < config.rapid_period.as_millis() as u64 {
            state.rapid_attempts += 1;
            if state.rapid_attempts >= config.max_rapid_attempts {
                state.banned = true;
                state.ban_expiry = now + config.ban_duration.as_millis() as u64;
                state.last_attempt = now;
                self.banned_recipients_count += 1;
                self.evict_if_needed();
                return RateLimitOutcome::RapidAttemptsBanned;
            }
        } else {
            state.rapid_attempts = 1;
        }
        state.last_attempt = now;

        // 3. active-ban check
        if state.banned {
            if now < state.ban_expiry {
                self.evict_if_needed();
                return RateLimitOutcome::ActivelyBanned;
            }
            state.banned = false;
            state.count = 0;
            state.last_reset = now;
            state.consecutive_failures = 0;
            state.rapid_attempts = 0;
            self.banned_recipients_count = self.banned_recipients_count.saturating_sub(1);
            ban_just_cleared = true;
        }

        // 4. consecutive-failure check
        if state.consecutive_failures >= config.max_consecutive_failures {
            if now.saturating_sub(state.last_failure) < config.failure_cooldown.as_millis() as u64 {
                state.banned = true;
                state.ban_expiry = now + config.ban_duration.as_millis() as u64;
                self.banned_recipients_count += 1;
                self.evict_if_needed();
                return RateLimitOutcome::ConsecutiveFailureBanned;
            }
            state.consecutive_failures = 0;
        }

        // 5. window reset
        if now.saturating_sub(state.last_reset) > config.cooldown_period.as_millis() as u64 {
            state.count = 0;
            state.last_reset = now;
        }

        // 6. burst check
        if state.count >= config.burst_limit {
            self.evict_if_needed();
            return RateLimitOutcome::BurstExceeded;
        }

        // 7. admit
        state.count += 1;
        self.evict_if_needed();
        if ban_just_cleared {
            RateLimitOutcome::AdmittedAfterBanExpired
        } else {
            RateLimitOutcome::Admitted
        }
    }

    /// Resets `consecutiveFailures` to 0 for `recipient` on a successful
    /// send (§4.6, §4.7).
    pub fn record_success(&mut self, recipient: &str) {
        if let Some(state) = self.recipients.get_mut(recipient) {
            state.consecutive_failures = 0;
        }
    }

    /// Increments `consecutiveFailures` and stamps `lastFailure` on a
    /// failed send (§4.6).
    pub fn record_failure(&mut self, recipient: &str, now: u64) {
        let state = self.recipients.entry(recipient.to_string()).or_default();
        state.consecutive_failures += 1;
        state.last_failure = now;
    }

    #[cfg(test)]
    pub fn state_of(&self, recipient: &str) -> Option<&RecipientLimitState> {
        self.recipients.get(recipient)
    }
}

impl RateLimitOutcome {
    pub fn into_error(self) -> Option<ErrorRecord> {
        if self.is_admitted() {
            None
        } else {
            Some(ErrorRecord::new(ErrorCode::RateLimit, self.message()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn config(burst: u32, cooldown_ms: u64) -> RateLimitConfig {
        RateLimitConfig {
            per_recipient: true,
            burst_limit: burst,
            cooldown_period: Duration::from_millis(cooldown_ms),
            ban_duration: Duration::from_millis(7_200_000),
            max_consecutive_failures: 3,
            failure_cooldown: Duration::from_millis(300_000),
            max_rapid_attempts: 10,
            rapid_period: Duration::from_millis(10_000),
            max_tracked_recipients: None,
        }
    }

    #[test]
    fn s1_burst_limit_rejects_third_send() {
        let mut controller = RateLimitController::new(config(2, 1_000));
        let base = 1_000_000;
        assert_eq!(controller.check("a@b.co", base), RateLimitOutcome::Admitted);
        assert_eq!(
            controller.check("a@b.co", base + 100),
            RateLimitOutcome::Admitted
        );
        assert_eq!(
            controller.check("a@b.co", base + 200),
            RateLimitOutcome::BurstExceeded
        );
    }

    #[test]
    fn s2_active_ban_rejects_without_opening_socket() {
        let mut controller = RateLimitController::new(config(5, 1_000));
        let now = 1_000_000;
        controller.check("a@b.co", now - 1);
        let state = controller.recipients.get_mut("a@b.co").unwrap();
        state.banned = true;
        state.ban_expiry = now + 3_600_000;

        assert_eq!(
            controller.check("a@b.co", now),
            RateLimitOutcome::ActivelyBanned
        );
    }

    #[test]
    fn s3_stale_window_resets_count() {
        let mut controller = RateLimitController::new(config(2, 1_000));
        let now = 1_000_000;
        {
            let state = controller.recipients.entry("a@b.co".into()).or_default();
            state.count = 2;
            state.last_reset = now - 1_100;
            state.last_attempt = now - 1_100;
        }

        assert_eq!(controller.check("a@b.co", now), RateLimitOutcome::Admitted);
        assert_eq!(controller.state_of("a@b.co").unwrap().count, 1);
    }

    #[test]
    fn s4_consecutive_failures_within_cooldown_bans() {
        let mut controller = RateLimitController::new(config(5, 1_000));
        let now = 1_000_000;
        {
            let state = controller.recipients.entry("a@b.co".into()).or_default();
            state.consecutive_failures = 3;
            state.last_failure = now;
        }

        assert_eq!(
            controller.check("a@b.co", now + 1),
            RateLimitOutcome::ConsecutiveFailureBanned
        );
        assert_eq!(controller.banned_recipients_count(), 1);
    }

    #[test]
    fn rapid_attempts_trigger_a_ban() {
        let mut controller = RateLimitController::new(config(1000, 1_000_000));
        let mut now = 1_000_000u64;
        let mut outcome = RateLimitOutcome::Admitted;
        for _ in 0..10 {
            outcome = controller.check("a@b.co", now);
            now += 10;
        }
        assert_eq!(outcome, RateLimitOutcome::RapidAttemptsBanned);
    }

    #[test]
    fn ban_clears_after_expiry() {
        let mut controller = RateLimitController::new(config(5, 1_000));
        let now = 1_000_000;
        {
            let state = controller.recipients.entry("a@b.co".into()).or_default();
            state.banned = true;
            state.ban_expiry = now;
            state.count = 4;
        }
        controller.banned_recipients_count = 1;

        let outcome = controller.check("a@b.co", now + 1);
        assert_eq!(outcome, RateLimitOutcome::AdmittedAfterBanExpired);
        assert!(outcome.is_admitted());
        assert!(outcome.is_ban_cleared());
        assert_eq!(controller.banned_recipients_count(), 0);
        assert_eq!(controller.state_of("a@b.co").unwrap().count, 1);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let mut controller = RateLimitController::new(config(5, 1_000));
        controller.check("a@b.co", 1_000_000);
        controller.record_failure("a@b.co", 1_000_100);
        assert_eq!(controller.state_of("a@b.co").unwrap().consecutive_failures, 1);
        controller.record_success("a@b.co");
        assert_eq!(controller.state_of("a@b.co").unwrap().consecutive_failures, 0);
    }
}
