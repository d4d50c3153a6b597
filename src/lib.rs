pub mod address;
pub mod attachment;
pub mod compose;
pub mod config;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod message;
pub mod metrics;
pub mod mime_types;
pub mod rate_limit;
pub mod sanitize;
pub mod smtp;
#[cfg(test)]
pub(crate) mod test_support;

pub use config::{AuthConfig, LoggingConfig, MailerConfig, MailerConfigBuilder, RateLimitConfig};
pub use error::{ErrorCode, ErrorKind, ErrorRecord};
pub use mailer::Mailer;
pub use message::{Attachment, MailRequest, Priority, SendResult};
pub use metrics::Metrics;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Ambient structured logging setup for callers embedding this crate in
/// a binary, distinct from the per-`Mailer` [`logging::StructuredLogger`]
/// (§4.8) which is a spec-level component of the mail pipeline itself.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=debug,info", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
