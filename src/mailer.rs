//! C10: the mailer facade (§4.10) — the single public entry point that
//! wires C1 (validation), C4/C5 (attachment + MIME), C6 (rate limiting),
//! C7 (metrics), C8 (logging), and C9 (the transaction engine) together
//! behind one instance-level mutex, per §5's concurrency model.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout as tokio_timeout;
use tracing::{error, info, instrument};

use crate::address;
use crate::attachment::{self, LoadedAttachment};
use crate::compose;
use crate::config::MailerConfig;
use crate::error::{ErrorCode, ErrorRecord};
use crate::logging::StructuredLogger;
use crate::message::{MailRequest, SendResult};
use crate::metrics::Metrics;
use crate::rate_limit::{now_ms, RateLimitController};
use crate::smtp::{run_transaction, TransactionContext};

struct MailerState {
    rate_limiter: RateLimitController,
    metrics: Metrics,
}

/// The programmatic API's sole entry point (§6): `new`, `send_mail`,
/// `verify_connection`, `get_metrics`.
pub struct Mailer {
    config: MailerConfig,
    logger: StructuredLogger,
    state: Mutex<MailerState>,
    cwd: PathBuf,
}

impl Mailer {
    pub fn new(config: MailerConfig) -> Self {
        let logger = StructuredLogger::new(&config.logging);
        let state = Mutex::new(MailerState {
            rate_limiter: RateLimitController::new(config.rate_limiting.clone()),
            metrics: Metrics::default(),
        });
        Self {
            config,
            logger,
            state,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Opens a probe socket, closes it immediately, and reports whether
    /// the server is reachable (§4.10). Run before every `send_mail`,
    /// doubling connection cost — preserved per spec.
    #[instrument(skip(self))]
    pub async fn verify_connection(&self) -> bool {
        let result = tokio_timeout(
            self.config.timeout,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await;

        match result {
            Ok(Ok(_stream)) => true,
            _ => {
                let mut state = self.state.lock().await;
                state.metrics.record_connection_error();
                false
            }
        }
    }

    /// Sends one message end to end (§4.10).
    #[instrument(skip(self, request), fields(subject = %request.subject))]
    pub async fn send_mail(&self, request: MailRequest) -> Result<SendResult, ErrorRecord> {
        self.logger.debug(
            "attempting to send mail",
            &[("to", json!(request.to)), ("subject", json!(request.subject))],
        );

        let recipients = request.all_recipients();
        let recipients_label = recipients.join(", ");
        let started_at = Instant::now();

        // Step 2: verifyConnection pre-empts the transaction entirely and
        // does not touch emails_total/the failure ledger (§7 Propagation).
        if !self.verify_connection().await {
            let error = ErrorRecord::new(ErrorCode::Connection, "could not verify connection to SMTP server");
            self.logger.error(
                "mail send failed",
                &[("to", json!(recipients_label)), ("code", json!(error.code))],
            );
            return Err(error);
        }

        // Step 4: validation rejections never open a socket and are
        // likewise excluded from emails_total (§7 Propagation).
        for recipient in &recipients {
            if let Err(error) = address::validate(recipient) {
                self.logger.error(
                    "mail send failed",
                    &[("to", json!(recipients_label)), ("code", json!(error.code))],
                );
                return Err(error);
            }
        }

        // Step 5: rate-limit rejections never open a socket and have
        // their own dedicated counter, not emails_total (§7 Propagation).
        if self.config.rate_limiting.per_recipient {
            let now = now_ms();
            let mut state = self.state.lock().await;
            for recipient in &recipients {
                let outcome = state.rate_limiter.check(recipient, now);
                if outcome.is_ban_cleared() {
                    state.metrics.record_ban_expired();
                }
                if !outcome.is_admitted() {
                    state.metrics.record_rate_limit_exceeded();
                    if outcome.is_new_ban() {
                        state.metrics.record_ban();
                    }
                    let error = outcome.into_error().unwrap_or_else(|| {
                        ErrorRecord::new(ErrorCode::RateLimit, "rate limit exceeded")
                    });
                    drop(state);
                    self.logger.error(
                        "mail send failed",
                        &[("to", json!(recipients_label)), ("code", json!(error.code))],
                    );
                    return Err(error);
                }
            }
        }

        let loaded_attachments = match self.load_attachments(&request).await {
            Ok(loaded) => loaded,
            Err(error) => {
                return Err(self
                    .finish_failure(&recipients, &recipients_label, started_at, error)
                    .await)
            }
        };

        let payload = compose::compose(&request, &self.config.from, &loaded_attachments);

        let context = TransactionContext {
            host: &self.config.host,
            port: self.config.port,
            secure: self.config.secure,
            timeout: self.config.timeout,
            auth: self.config.auth.as_ref(),
            from: &self.config.from,
            recipients: &recipients,
            payload: &payload,
        };

        match run_transaction(&context).await {
            Ok(outcome) => {
                let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
                let mut state = self.state.lock().await;
                state.metrics.record_success(elapsed_ms, chrono::Utc::now());
                for recipient in &recipients {
                    state.rate_limiter.record_success(recipient);
                }
                drop(state);

                self.logger.info(
                    "mail sent",
                    &[
                        ("to", json!(recipients_label)),
                        ("message_id", json!(outcome.message_id)),
                    ],
                );

                info!(message_id = %outcome.message_id, "mail sent");

                Ok(SendResult {
                    success: true,
                    message_id: Some(outcome.message_id),
                    error: None,
                    recipients: recipients_label,
                    timestamp: chrono::Utc::now(),
                })
            }
            Err(engine_error) => {
                let error = engine_error.into_error_record();
                Err(self
                    .finish_failure(&recipients, &recipients_label, started_at, error)
                    .await)
            }
        }
    }

    async fn load_attachments(&self, request: &MailRequest) -> Result<Vec<LoadedAttachment>, ErrorRecord> {
        let mut loaded = Vec::with_capacity(request.attachments.len());
        for attachment in &request.attachments {
            match attachment::load_attachment(attachment, &self.cwd).await {
                Ok(Some(file)) => loaded.push(file),
                Ok(None) => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(loaded)
    }

    /// Records a failed send across metrics, the rate limiter's
    /// consecutive-failure counter, and the structured logger, then
    /// returns the (possibly enriched) error for the caller (§4.10 step 6,
    /// §7 "any failure ... counts as one failure for every listed
    /// recipient").
    async fn finish_failure(
        &self,
        recipients: &[String],
        recipients_label: &str,
        started_at: Instant,
        error: ErrorRecord,
    ) -> ErrorRecord {
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        let kind = error.kind();
        let now = now_ms();

        {
            let mut state = self.state.lock().await;
            state
                .metrics
                .record_failure(kind, error.clone(), recipients, elapsed_ms, chrono::Utc::now());
            for recipient in recipients {
                state.rate_limiter.record_failure(recipient, now);
            }
        }

        self.logger.error(
            "mail send failed",
            &[
                ("to", json!(recipients_label)),
                ("code", json!(error.code)),
                ("message", json!(error.message)),
            ],
        );

        error!(code = %error.code, to = %recipients_label, "mail send failed");

        error
    }

    /// A shallow snapshot of the metrics structure (§4.10).
    pub async fn get_metrics(&self) -> Metrics {
        self.state.lock().await.metrics.clone()
    }

    /// Current count of banned recipients, convenience accessor mirrored
    /// from `metrics.banned_recipients_count` for callers that only need
    /// this one figure.
    pub async fn banned_recipients_count(&self) -> u64 {
        self.state.lock().await.rate_limiter.banned_recipients_count()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::MailerConfigBuilder;

    fn config(port: u16) -> MailerConfig {
        MailerConfigBuilder::new("127.0.0.1", port)
            .from("noreply@example.com")
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn s5_invalid_host_rejects_with_econnection() {
        // Port 1 is reserved and will refuse immediately on most hosts.
        let mailer = Mailer::new(config(1));
        let request = MailRequest::new("a@b.co", "x").text("y");
        let result = mailer.send_mail(request).await;
        assert!(result.is_err());
        let error = result.unwrap_err();
        assert_eq!(error.code, "ECONNECTION");

        let metrics = mailer.get_metrics().await;
        assert_eq!(metrics.emails_total, 0);
        assert!(metrics.connection_errors >= 1);
    }

    #[tokio::test]
    async fn s6_invalid_address_rejects_after_probe_succeeds() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept and hold connections open so verify_connection's
            // probe succeeds; never speak SMTP, so a transaction attempt
            // would hang — proving validation short-circuits first.
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let mailer = Mailer::new(config(port));
        let request = MailRequest::new("notanemail", "x").text("y");
        let result = tokio::time::timeout(Duration::from_secs(2), mailer.send_mail(request))
            .await
            .expect("send_mail should not hang past address validation");

        let error = result.unwrap_err();
        assert_eq!(error.code, "EINVALIDEMAIL");

        let metrics = mailer.get_metrics().await;
        assert_eq!(metrics.emails_total, 0);
    }

    #[tokio::test]
    async fn verify_connection_false_when_nothing_listens() {
        let port = crate::test_support::random_port();
        let mailer = Mailer::new(config(port));
        assert!(!mailer.verify_connection().await);

        let metrics = mailer.get_metrics().await;
        assert!(metrics.connection_errors >= 1);
    }
}
