//! C9: the SMTP transaction engine.

pub mod reply;
pub mod tls;
pub mod transaction;

pub use transaction::{run_transaction, SmtpStream, TransactionContext, TransactionOutcome};
