//! The C9 state machine: CONNECT → EHLO → [STARTTLS → EHLO] → AUTH →
//! MAIL_FROM → RCPT_TO* → DATA → PAYLOAD → QUIT/CLOSE (§4.9).
//!
//! Generic over any `AsyncRead + AsyncWrite + Unpin + Send` duplex so the
//! dialogue itself — the part carrying real protocol logic — is testable
//! with in-process duplex pairs (`crate::test_support::mock_smtp_pair`)
//! rather than a live socket.

use std::pin::Pin;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument};

use crate::config::AuthConfig;
use crate::error::SmtpEngineError;
use crate::smtp::reply::{read_reply, Reply};
use crate::smtp::tls::build_client_config;

/// A duplex async byte stream, boxable so the transaction engine can
/// swap the underlying transport (plain TCP, then TLS) without changing
/// the type the dialogue logic is written against.
pub trait AsyncDuplex: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncDuplex for T {}

pub type SmtpStream = Pin<Box<dyn AsyncDuplex>>;

fn box_stream<S: AsyncDuplex + 'static>(stream: S) -> SmtpStream {
    Box::pin(stream)
}

/// Inputs for one transaction, assembled by the facade (C10).
pub struct TransactionContext<'a> {
    pub host: &'a str,
    pub port: u16,
    pub secure: bool,
    pub timeout: Duration,
    pub auth: Option<&'a AuthConfig>,
    pub from: &'a str,
    pub recipients: &'a [String],
    pub payload: &'a str,
}

#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub message_id: String,
}

fn generate_message_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn send_line<S: AsyncWrite + Unpin>(stream: &mut S, line: &str) -> std::io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await
}

/// Writes `command`, awaits one (possibly multi-line) reply within
/// `timeout_duration`, and rejects on any non-2xx/3xx code (§9 open
/// question 2; see DESIGN.md).
async fn send_command<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    command: &str,
    timeout_duration: Duration,
    log_command: &str,
) -> Result<Reply, SmtpEngineError> {
    send_line(stream, command)
        .await
        .map_err(|source| SmtpEngineError::Io {
            host: String::new(),
            port: 0,
            source,
        })?;

    let reply = timeout(timeout_duration, read_reply(stream))
        .await
        .map_err(|_| SmtpEngineError::IdleTimeout {
            command: log_command.to_string(),
        })?
        .map_err(|_| SmtpEngineError::MalformedReply {
            command: log_command.to_string(),
        })?;

    debug!(command = log_command, code = reply.code, "smtp reply");

    if !reply.is_success() && !reply.is_intermediate() {
        return Err(SmtpEngineError::Rejected {
            command: log_command.to_string(),
            response: reply.text(),
        });
    }

    Ok(reply)
}

/// Opens the TCP connection and, for implicit TLS, wraps it immediately.
async fn connect(host: &str, port: u16, secure: bool, timeout_duration: Duration) -> Result<SmtpStream, SmtpEngineError> {
    let tcp = timeout(timeout_duration, TcpStream::connect((host, port)))
        .await
        .map_err(|_| SmtpEngineError::ConnectTimeout {
            host: host.to_string(),
            port,
        })?
        .map_err(|source| SmtpEngineError::Io {
            host: host.to_string(),
            port,
            source,
        })?;

    if !secure {
        return Ok(box_stream(tcp));
    }

    upgrade_to_tls(box_stream(tcp), host).await
}

async fn upgrade_to_tls(stream: SmtpStream, host: &str) -> Result<SmtpStream, SmtpEngineError> {
    let client_config = build_client_config().map_err(|source| SmtpEngineError::Tls {
        host: host.to_string(),
        source: std::io::Error::other(source),
    })?;
    let connector = TlsConnector::from(client_config);
    let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|source| SmtpEngineError::Tls {
            host: host.to_string(),
            source: std::io::Error::other(source),
        })?;

    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|source| SmtpEngineError::Tls {
            host: host.to_string(),
            source,
        })?;

    Ok(box_stream(tls_stream))
}

/// Runs the full transaction against a live server at `ctx.host:ctx.port`.
#[instrument(skip(ctx), fields(host = ctx.host, port = ctx.port))]
pub async fn run_transaction(ctx: &TransactionContext<'_>) -> Result<TransactionOutcome, SmtpEngineError> {
    let stream = connect(ctx.host, ctx.port, ctx.secure, ctx.timeout).await?;
    let mut reader = BufReader::new(stream);

    send_command(&mut reader, &format!("EHLO {}", ctx.host), ctx.timeout, "EHLO").await?;

    if !ctx.secure {
        send_command(&mut reader, "STARTTLS", ctx.timeout, "STARTTLS").await?;
        // Corrected from §9 open question 1: route subsequent traffic
        // through the upgraded socket and re-EHLO over it.
        let plain = reader.into_inner();
        let tls = upgrade_to_tls(plain, ctx.host).await?;
        reader = BufReader::new(tls);
        send_command(&mut reader, &format!("EHLO {}", ctx.host), ctx.timeout, "EHLO").await?;
    }

    dialogue(&mut reader, ctx).await
}

/// The part of the state machine from AUTH onward — independent of how
/// the stream reached a secure (or intentionally plaintext) state, and
/// what the test suite below drives directly with an in-process duplex
/// pair.
async fn dialogue<S: AsyncRead + AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
    ctx: &TransactionContext<'_>,
) -> Result<TransactionOutcome, SmtpEngineError> {
    if let Some(auth) = ctx.auth {
        send_command(reader, "AUTH LOGIN", ctx.timeout, "AUTH LOGIN").await?;
        send_command(
            reader,
            &Base64::encode_string(auth.user.as_bytes()),
            ctx.timeout,
            "AUTH LOGIN (username)",
        )
        .await?;
        send_command(
            reader,
            &Base64::encode_string(auth.pass.as_bytes()),
            ctx.timeout,
            "AUTH LOGIN (password)",
        )
        .await?;
    }

    send_command(reader, &format!("MAIL FROM:<{}>", ctx.from), ctx.timeout, "MAIL FROM").await?;

    for recipient in ctx.recipients {
        send_command(reader, &format!("RCPT TO:<{recipient}>"), ctx.timeout, "RCPT TO").await?;
    }

    send_command(reader, "DATA", ctx.timeout, "DATA").await?;

    reader
        .write_all(ctx.payload.as_bytes())
        .await
        .map_err(|source| SmtpEngineError::Io {
            host: ctx.host.to_string(),
            port: ctx.port,
            source,
        })?;
    let payload_reply = timeout(ctx.timeout, read_reply(reader))
        .await
        .map_err(|_| SmtpEngineError::IdleTimeout {
            command: "DATA payload".to_string(),
        })?
        .map_err(|_| SmtpEngineError::MalformedReply {
            command: "DATA payload".to_string(),
        })?;
    if !payload_reply.is_success() {
        return Err(SmtpEngineError::Rejected {
            command: "DATA payload".to_string(),
            response: payload_reply.text(),
        });
    }

    let _ = send_command(reader, "QUIT", ctx.timeout, "QUIT").await;

    Ok(TransactionOutcome {
        message_id: generate_message_id(),
    })
}
