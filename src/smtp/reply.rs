//! RFC 5321 reply parsing.
//!
//! A line-buffered reader that collects a full (possibly multi-line)
//! reply and parses its 3-digit code, rejecting anything it can't make
//! sense of rather than treating arbitrary socket data as success (§9
//! open question 2). Hand-rolled rather than built on a command-parsing
//! crate shaped for the server side of this protocol; see DESIGN.md.

use tokio::io::AsyncBufReadExt;

#[derive(Debug, Clone)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.code)
    }

    pub fn is_intermediate(&self) -> bool {
        self.code == 334
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyParseError {
    #[error("malformed reply line: {0:?}")]
    Malformed(String),
    #[error("connection closed while waiting for a reply")]
    Closed,
    #[error("io error reading reply: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one full reply (possibly multiple `<code>-text` continuation
/// lines terminated by a final `<code> text` line) from `reader`.
pub async fn read_reply<R>(reader: &mut R) -> Result<Reply, ReplyParseError>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut lines = Vec::new();
    let mut code: Option<u16> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Err(ReplyParseError::Closed);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.len() < 4 {
            return Err(ReplyParseError::Malformed(trimmed.to_string()));
        }
        let (code_str, rest) = trimmed.split_at(3);
        let line_code: u16 = code_str
            .parse()
            .map_err(|_| ReplyParseError::Malformed(trimmed.to_string()))?;
        let separator = rest.chars().next();
        let text = rest.get(1..).unwrap_or("").to_string();

        match code {
            None => code = Some(line_code),
            Some(existing) if existing != line_code => {
                return Err(ReplyParseError::Malformed(trimmed.to_string()));
            }
            _ => {}
        }
        lines.push(text);

        match separator {
            Some('-') => continue,
            Some(' ') | None => break,
            _ => return Err(ReplyParseError::Malformed(trimmed.to_string())),
        }
    }

    Ok(Reply {
        code: code.unwrap(),
        lines,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn parses_single_line_reply() {
        let data = b"250 OK\r\n".to_vec();
        let mut reader = BufReader::new(&data[..]);
        let reply = read_reply(&mut reader).await.unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, vec!["OK".to_string()]);
        assert!(reply.is_success());
    }

    #[tokio::test]
    async fn parses_multiline_reply() {
        let data = b"250-first\r\n250-second\r\n250 last\r\n".to_vec();
        let mut reader = BufReader::new(&data[..]);
        let reply = read_reply(&mut reader).await.unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, vec!["first", "second", "last"]);
    }

    #[tokio::test]
    async fn rejects_5xx_as_non_success() {
        let data = b"550 Mailbox unavailable\r\n".to_vec();
        let mut reader = BufReader::new(&data[..]);
        let reply = read_reply(&mut reader).await.unwrap();
        assert_eq!(reply.code, 550);
        assert!(!reply.is_success());
    }

    #[tokio::test]
    async fn closed_connection_is_an_error() {
        let data: Vec<u8> = vec![];
        let mut reader = BufReader::new(&data[..]);
        let result = read_reply(&mut reader).await;
        assert!(matches!(result, Err(ReplyParseError::Closed)));
    }

    #[tokio::test]
    async fn malformed_line_is_an_error() {
        let data = b"not-a-reply\r\n".to_vec();
        let mut reader = BufReader::new(&data[..]);
        let result = read_reply(&mut reader).await;
        assert!(matches!(result, Err(ReplyParseError::Malformed(_))));
    }

    #[tokio::test]
    async fn intermediate_334_is_recognized() {
        let data = b"334 VXNlcm5hbWU6\r\n".to_vec();
        let mut reader = BufReader::new(&data[..]);
        let reply = read_reply(&mut reader).await.unwrap();
        assert!(reply.is_intermediate());
    }
}
