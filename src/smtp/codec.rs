//! Wire codec: framed line I/O over a byte stream that can be upgraded to
//! TLS in place (STARTTLS), plus the dot-stuffed DATA reader.

use crate::error::{MailError, Result};
use crate::security::TlsConfig;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// Lines longer than this (excluding CRLF) are refused with a syntax error.
const MAX_LINE_LENGTH: usize = 1000;

/// Unified stream so STARTTLS can replace the underlying transport without
/// changing the `Connection`'s type.
enum SmtpStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    /// Placeholder occupied only for the instant of a STARTTLS swap.
    Upgrading,
}

impl AsyncRead for SmtpStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            SmtpStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            SmtpStream::Upgrading => panic!("I/O attempted on SmtpStream mid-STARTTLS"),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SmtpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            SmtpStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            SmtpStream::Upgrading => panic!("I/O attempted on SmtpStream mid-STARTTLS"),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            SmtpStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            SmtpStream::Upgrading => panic!("I/O attempted on SmtpStream mid-STARTTLS"),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SmtpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            SmtpStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            SmtpStream::Upgrading => panic!("I/O attempted on SmtpStream mid-STARTTLS"),
        }
    }
}

/// Framed line I/O plus the dot-reader and in-place TLS upgrade, per the
/// wire codec contract.
pub struct Connection {
    reader: BufReader<SmtpStream>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            reader: BufReader::new(SmtpStream::Plain(stream)),
        }
    }

    /// Returns the next line with its trailing CRLF stripped, or `None` on
    /// EOF or idle timeout (both mean "stop talking to this client").
    pub async fn read_line(&mut self, idle_timeout: Duration) -> Result<Option<String>> {
        let mut line = String::new();
        let n = match tokio::time::timeout(idle_timeout, self.reader.read_line(&mut line)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Ok(None),
        };
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        if line.len() > MAX_LINE_LENGTH {
            return Err(MailError::Syntax("line too long".into()));
        }
        Ok(Some(line))
    }

    pub async fn write_reply(&mut self, code: u16, text: &str) -> Result<()> {
        self.reader
            .write_all(format!("{code} {text}\r\n").as_bytes())
            .await?;
        self.reader.flush().await?;
        Ok(())
    }

    /// Emits an intermediate line of a multi-line response (`code-text`).
    /// Must be followed eventually by a `write_reply` with the same code.
    pub async fn write_multi_reply(&mut self, code: u16, text: &str) -> Result<()> {
        self.reader
            .write_all(format!("{code}-{text}\r\n").as_bytes())
            .await?;
        Ok(())
    }

    /// Reads DATA payload up to (excluding) the `\r\n.\r\n` terminator,
    /// reversing dot-stuffing. Fails if the stream ends first.
    pub async fn read_dot_body(&mut self, idle_timeout: Duration, max_size: usize) -> Result<Vec<u8>> {
        let mut content = Vec::new();

        loop {
            let mut line = String::new();
            let n = match tokio::time::timeout(idle_timeout, self.reader.read_line(&mut line)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(MailError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "timed out waiting for DATA",
                    )))
                }
            };
            if n == 0 {
                return Err(MailError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed during DATA",
                )));
            }

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed == "." {
                break;
            }

            let mut line_bytes = line.into_bytes();
            if line_bytes.starts_with(b"..") {
                line_bytes.remove(0);
            }

            if content.len() + line_bytes.len() > max_size {
                return Err(MailError::Syntax(format!(
                    "message exceeds maximum size of {max_size} bytes"
                )));
            }
            content.extend_from_slice(&line_bytes);
        }

        Ok(content)
    }

    /// Upgrades the underlying transport to TLS in place. The reader/writer
    /// borrowed from it keep working afterwards over the encrypted stream.
    ///
    /// On handshake failure the underlying TCP stream has already been
    /// consumed by the failed handshake and cannot be recovered; the
    /// connection is left unusable and the caller must terminate the
    /// session without attempting further I/O over it.
    pub async fn upgrade_tls(&mut self, tls_config: &TlsConfig) -> Result<()> {
        let inner = std::mem::replace(&mut self.reader, BufReader::new(SmtpStream::Upgrading)).into_inner();
        let tcp = match inner {
            SmtpStream::Plain(tcp) => tcp,
            other => {
                // Not reachable via the session's tls_active guard, but restore
                // the stream rather than stranding a connection that's still usable.
                self.reader = BufReader::new(other);
                return Err(MailError::Tls("connection is not eligible for a TLS upgrade".into()));
            }
        };

        match tls_config.acceptor().accept(tcp).await {
            Ok(tls_stream) => {
                self.reader = BufReader::new(SmtpStream::Tls(Box::new(tls_stream)));
                Ok(())
            }
            Err(e) => Err(MailError::Tls(format!("TLS handshake failed: {e}"))),
        }
    }
}
