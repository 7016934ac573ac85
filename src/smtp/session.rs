//! Per-connection SMTP session: the state machine that drives one client
//! from the greeting through `QUIT`, including STARTTLS and the SASL AUTH
//! sub-exchange (RFC 5321, RFC 3207, RFC 4954).

use crate::config::Config;
use crate::envelope::Envelope;
use crate::error::{MailError, Result};
use crate::security::auth::Authenticator;
use crate::security::{AuthMechanism, AuthOutcome, AuthenticationService, TlsConfig};
use crate::smtp::codec::Connection;
use crate::smtp::commands::SmtpCommand;
use crate::storage::Receiver;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// How far the current transaction has progressed since the last
/// RSET/STARTTLS. `authenticated` and `tls_active` are tracked separately
/// since they persist across a transaction reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Fresh,
    Greeted,
    MailAcked,
    RcptAcked,
}

pub enum SessionResult {
    Continue,
    Quit,
}

/// One accepted connection's worth of protocol state.
pub struct SmtpSession {
    conn: Connection,
    peer: String,
    hostname: String,
    state: SessionState,
    envelope: Envelope,
    authenticated: bool,
    tls_active: bool,
    secure: bool,
    max_message_size: usize,
    command_timeout: Duration,
    data_timeout: Duration,
    tls_config: Option<Arc<TlsConfig>>,
    authenticator: Option<Arc<dyn AuthenticationService>>,
    receiver: Arc<dyn Receiver>,
}

impl SmtpSession {
    pub fn new(
        stream: TcpStream,
        peer: String,
        config: &Config,
        tls_config: Option<Arc<TlsConfig>>,
        authenticator: Option<Arc<dyn AuthenticationService>>,
        receiver: Arc<dyn Receiver>,
    ) -> Self {
        let hostname = config.server.hostname.clone();
        Self {
            conn: Connection::new(stream),
            peer,
            envelope: Envelope {
                message_id: generate_id(&hostname),
                ..Default::default()
            },
            hostname,
            state: SessionState::Fresh,
            authenticated: false,
            tls_active: false,
            secure: config.smtp.secure,
            max_message_size: config.smtp.max_message_size,
            command_timeout: Duration::from_secs(config.smtp.command_timeout_secs),
            data_timeout: Duration::from_secs(config.smtp.data_timeout_secs),
            tls_config,
            authenticator,
            receiver,
        }
    }

    /// Drives the session to completion: greeting, command loop, and either
    /// a `QUIT` or an idle/EOF disconnect.
    pub async fn run(&mut self) -> Result<()> {
        self.conn
            .write_reply(220, &format!("{} ESMTP ready", self.hostname))
            .await?;

        loop {
            let line = match self.conn.read_line(self.command_timeout).await? {
                Some(line) => line,
                None => {
                    info!("connection from {} ended", self.peer);
                    return Ok(());
                }
            };

            match self.dispatch(&line).await {
                Ok(SessionResult::Continue) => {}
                Ok(SessionResult::Quit) => return Ok(()),
                Err(MailError::Io(e)) => return Err(MailError::Io(e)),
                // A failed TLS handshake consumes the underlying stream; it
                // can't be written to again, so the session must terminate
                // without attempting a reply over it.
                Err(MailError::Tls(detail)) => {
                    warn!("connection from {} terminated after TLS failure: {}", self.peer, detail);
                    return Err(MailError::Tls(detail));
                }
                Err(e) => {
                    let (code, text) = reply_for(&e);
                    self.conn.write_reply(code, &text).await?;
                }
            }
        }
    }

    async fn dispatch(&mut self, line: &str) -> Result<SessionResult> {
        let command = SmtpCommand::parse(line)?;

        match command {
            SmtpCommand::Helo(domain) => self.handle_helo(domain).await,
            SmtpCommand::Ehlo(domain) => self.handle_ehlo(domain).await,
            SmtpCommand::MailFrom(path) => self.handle_mail_from(path).await,
            SmtpCommand::RcptTo(path) => self.handle_rcpt_to(path).await,
            SmtpCommand::Data => self.handle_data().await,
            SmtpCommand::Rset => self.handle_rset().await,
            SmtpCommand::Noop => {
                self.conn.write_reply(250, "OK").await?;
                Ok(SessionResult::Continue)
            }
            SmtpCommand::Quit => {
                self.conn
                    .write_reply(221, &format!("{} service closing transmission channel", self.hostname))
                    .await?;
                Ok(SessionResult::Quit)
            }
            SmtpCommand::Starttls => self.handle_starttls().await,
            SmtpCommand::Auth(mechanism, initial) => self.handle_auth(mechanism, initial).await,
            SmtpCommand::Unknown(verb) => {
                self.conn
                    .write_reply(502, &format!("Command not implemented: {verb}"))
                    .await?;
                Ok(SessionResult::Continue)
            }
        }
    }

    async fn handle_helo(&mut self, domain: String) -> Result<SessionResult> {
        if self.state != SessionState::Fresh {
            return Err(MailError::OutOfOrder("EHLO/HELO already received".into()));
        }
        self.state = SessionState::Greeted;
        self.conn
            .write_reply(250, &format!("{} Hello {}", self.hostname, domain))
            .await?;
        Ok(SessionResult::Continue)
    }

    async fn handle_ehlo(&mut self, domain: String) -> Result<SessionResult> {
        if self.state != SessionState::Fresh {
            return Err(MailError::OutOfOrder("EHLO/HELO already received".into()));
        }
        self.state = SessionState::Greeted;

        let mut lines = vec![format!("{} Hello {}", self.hostname, domain)];
        if self.tls_config.is_some() && !self.tls_active {
            lines.push("STARTTLS".to_string());
        }
        if self.authenticator.is_some() {
            lines.push("AUTH PLAIN LOGIN CRAM-MD5".to_string());
        }

        let last = lines.len() - 1;
        for (i, text) in lines.iter().enumerate() {
            if i == last {
                self.conn.write_reply(250, text).await?;
            } else {
                self.conn.write_multi_reply(250, text).await?;
            }
        }
        Ok(SessionResult::Continue)
    }

    async fn handle_mail_from(&mut self, path: String) -> Result<SessionResult> {
        if self.secure && !self.authenticated {
            return Err(MailError::AuthRequired);
        }
        if self.state == SessionState::Fresh {
            return Err(MailError::OutOfOrder("send EHLO/HELO first".into()));
        }
        if self.state != SessionState::Greeted {
            return Err(MailError::OutOfOrder("MAIL FROM already received".into()));
        }

        self.envelope.sender = path;
        self.envelope.recipients.clear();
        self.state = SessionState::MailAcked;
        self.conn.write_reply(250, "OK").await?;
        Ok(SessionResult::Continue)
    }

    async fn handle_rcpt_to(&mut self, path: String) -> Result<SessionResult> {
        if self.secure && !self.authenticated {
            return Err(MailError::AuthRequired);
        }
        if self.state == SessionState::Fresh {
            return Err(MailError::OutOfOrder("send EHLO/HELO first".into()));
        }
        if !matches!(self.state, SessionState::MailAcked | SessionState::RcptAcked) {
            return Err(MailError::OutOfOrder("send MAIL FROM first".into()));
        }

        self.envelope.recipients.push(path);
        self.state = SessionState::RcptAcked;
        self.conn.write_reply(250, "OK").await?;
        Ok(SessionResult::Continue)
    }

    async fn handle_data(&mut self) -> Result<SessionResult> {
        if self.secure && !self.authenticated {
            return Err(MailError::AuthRequired);
        }
        if self.state == SessionState::Fresh {
            return Err(MailError::OutOfOrder("send EHLO/HELO first".into()));
        }
        if self.state != SessionState::RcptAcked {
            return Err(MailError::OutOfOrder(
                "need MAIL FROM and at least one RCPT TO first".into(),
            ));
        }

        self.conn
            .write_reply(354, "Start mail input; end with <CRLF>.<CRLF>")
            .await?;
        let content = self
            .conn
            .read_dot_body(self.data_timeout, self.max_message_size)
            .await?;
        self.envelope.content = content;
        self.conn.write_reply(250, "OK: message accepted").await?;

        // The 250 is already on the wire; a receiver failure is logged, not
        // surfaced, since the client has no further opportunity to react to it.
        let envelope = std::mem::replace(
            &mut self.envelope,
            Envelope {
                message_id: generate_id(&self.hostname),
                ..Default::default()
            },
        );
        let message_id = envelope.message_id.clone();
        if let Err(e) = self.receiver.receive(envelope).await {
            warn!("receiver failed for {}: {}", message_id, e);
        }

        self.state = SessionState::Greeted;
        Ok(SessionResult::Continue)
    }

    async fn handle_rset(&mut self) -> Result<SessionResult> {
        if self.state == SessionState::Fresh {
            return Err(MailError::OutOfOrder("send EHLO/HELO first".into()));
        }
        self.envelope = Envelope {
            message_id: generate_id(&self.hostname),
            ..Default::default()
        };
        self.state = SessionState::Greeted;
        self.conn.write_reply(250, "OK").await?;
        Ok(SessionResult::Continue)
    }

    async fn handle_starttls(&mut self) -> Result<SessionResult> {
        let Some(tls_config) = self.tls_config.clone() else {
            self.conn.write_reply(502, "TLS not available").await?;
            return Ok(SessionResult::Continue);
        };
        if self.tls_active {
            return Err(MailError::OutOfOrder("TLS is already active".into()));
        }

        self.conn.write_reply(220, "Ready to start TLS").await?;
        self.conn.upgrade_tls(&tls_config).await?;
        self.tls_active = true;

        // RFC 3207: prior state is discarded, the client must say EHLO again.
        self.state = SessionState::Fresh;
        self.envelope = Envelope {
            message_id: generate_id(&self.hostname),
            ..Default::default()
        };
        Ok(SessionResult::Continue)
    }

    async fn handle_auth(
        &mut self,
        mechanism: String,
        initial: Option<String>,
    ) -> Result<SessionResult> {
        let Some(authenticator) = self.authenticator.clone() else {
            self.conn.write_reply(502, "AUTH not supported").await?;
            return Ok(SessionResult::Continue);
        };
        if self.authenticated {
            return Err(MailError::OutOfOrder("already authenticated".into()));
        }
        let Some(mechanism) = AuthMechanism::from_str(&mechanism) else {
            return Err(MailError::Syntax(format!(
                "unrecognized AUTH mechanism: {mechanism}"
            )));
        };
        if mechanism.requires_tls() && !self.tls_active {
            return Err(MailError::TlsRequired);
        }

        let outcome = match mechanism {
            AuthMechanism::Plain => self.auth_plain(&authenticator, initial).await?,
            AuthMechanism::Login => self.auth_login(&authenticator, initial).await?,
            AuthMechanism::CramMd5 => self.auth_cram_md5(&authenticator).await?,
        };

        match outcome {
            AuthOutcome::Ok => {
                self.authenticated = true;
                self.conn.write_reply(235, "Authentication successful").await?;
                Ok(SessionResult::Continue)
            }
            AuthOutcome::InvalidCredential => Err(MailError::InvalidCredential),
            AuthOutcome::ServerError(e) => Err(MailError::AuthServer(e)),
        }
    }

    /// Sends a `334` continuation prompt and reads the client's next line.
    async fn read_auth_continuation(&mut self, prompt: &str) -> Result<String> {
        self.conn.write_reply(334, prompt).await?;
        match self.conn.read_line(self.command_timeout).await? {
            Some(line) => Ok(line),
            None => Err(MailError::AuthServer(
                "connection closed during authentication".into(),
            )),
        }
    }

    async fn auth_plain(
        &mut self,
        authenticator: &Arc<dyn AuthenticationService>,
        initial: Option<String>,
    ) -> Result<AuthOutcome> {
        let data = match initial {
            Some(d) => d,
            None => self.read_auth_continuation("").await?,
        };
        let (username, password) = Authenticator::decode_plain_auth(&data)?;
        Ok(authenticator.authenticate(&username, password.as_bytes()).await)
    }

    async fn auth_login(
        &mut self,
        authenticator: &Arc<dyn AuthenticationService>,
        initial: Option<String>,
    ) -> Result<AuthOutcome> {
        let username_b64 = match initial {
            Some(d) => d,
            None => self.read_auth_continuation("VXNlcm5hbWU6").await?,
        };
        let username = Authenticator::decode_login_credential(&username_b64)?;

        let password_b64 = self.read_auth_continuation("UGFzc3dvcmQ6").await?;
        let password = Authenticator::decode_login_credential(&password_b64)?;

        Ok(authenticator.authenticate(&username, password.as_bytes()).await)
    }

    async fn auth_cram_md5(
        &mut self,
        authenticator: &Arc<dyn AuthenticationService>,
    ) -> Result<AuthOutcome> {
        let challenge = generate_id(&self.hostname);
        let challenge_b64 = BASE64.encode(challenge.as_bytes());

        let response = self.read_auth_continuation(&challenge_b64).await?;
        let (username, response_hex) = Authenticator::decode_cram_response(&response)?;

        Ok(authenticator
            .validate_hmac(&username, challenge.as_bytes(), &response_hex)
            .await)
    }
}

/// Maps a protocol-level error to the SMTP reply it produces. The detail
/// string is folded into the reply text; each variant's code is fixed by
/// its meaning (see `error::MailError`).
fn reply_for(err: &MailError) -> (u16, String) {
    let code = match err {
        MailError::Syntax(_) => 501,
        MailError::OutOfOrder(_) => 503,
        MailError::AuthRequired => 503,
        MailError::InvalidCredential => 535,
        MailError::TlsRequired => 538,
        MailError::AuthServer(_) => 454,
        MailError::Tls(_) => 454,
        MailError::Database(_) => 454,
        _ => 554,
    };
    (code, err.to_string())
}

/// A unique angle-bracketed identifier of the form `<nanotime.pid@hostname>`,
/// used both as the envelope's `message_id` and as the CRAM-MD5 challenge.
fn generate_id(hostname: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("<{}.{}@{}>", nanos, std::process::id(), hostname)
}
