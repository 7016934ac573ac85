//! SMTP command parsing (RFC 5321 verbs plus STARTTLS/AUTH)
//!
//! Parsing is strict: anything that doesn't match a known verb's required
//! shape is rejected with a syntax error rather than guessed at.

use crate::error::{MailError, Result};

/// SMTP protocol commands.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Quit,
    Noop,
    /// STARTTLS command to upgrade connection to TLS
    Starttls,
    /// AUTH command with mechanism and optional initial response
    /// Format: AUTH mechanism [initial-response]
    Auth(String, Option<String>),
    Unknown(String),
}

impl SmtpCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(MailError::Syntax("Empty command".to_string()));
        }

        let parts: Vec<&str> = line.splitn(2, ' ').collect();
        let command = parts[0];
        let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

        match command {
            "HELO" => {
                if args.is_empty() {
                    return Err(MailError::Syntax("HELO requires domain".to_string()));
                }
                Ok(SmtpCommand::Helo(args.to_string()))
            }
            "EHLO" => {
                if args.is_empty() {
                    return Err(MailError::Syntax("EHLO requires domain".to_string()));
                }
                Ok(SmtpCommand::Ehlo(args.to_string()))
            }
            "MAIL" => {
                // Parse MAIL FROM:<address>
                let from = Self::parse_mail_from(args)?;
                Ok(SmtpCommand::MailFrom(from))
            }
            "RCPT" => {
                // Parse RCPT TO:<address>
                let to = Self::parse_rcpt_to(args)?;
                Ok(SmtpCommand::RcptTo(to))
            }
            "DATA" => Ok(SmtpCommand::Data),
            "RSET" => Ok(SmtpCommand::Rset),
            "QUIT" => Ok(SmtpCommand::Quit),
            "NOOP" => Ok(SmtpCommand::Noop),
            "STARTTLS" => Ok(SmtpCommand::Starttls),
            "AUTH" => {
                // Parse AUTH mechanism [initial-response]
                if args.is_empty() {
                    return Err(MailError::Syntax("AUTH requires mechanism".to_string()));
                }
                let auth_parts: Vec<&str> = args.splitn(2, ' ').collect();
                let mechanism = auth_parts[0].to_string();
                let initial_response = auth_parts.get(1).map(|s| s.to_string());
                Ok(SmtpCommand::Auth(mechanism, initial_response))
            }
            _ => Ok(SmtpCommand::Unknown(command.to_string())),
        }
    }

    fn parse_mail_from(args: &str) -> Result<String> {
        // Expected format: FROM:<email@domain.com>
        if !args.to_uppercase().starts_with("FROM:") {
            return Err(MailError::Syntax("Invalid MAIL FROM syntax".to_string()));
        }

        let email = args[5..].trim();
        let email = if email.starts_with('<') && email.ends_with('>') {
            &email[1..email.len() - 1]
        } else {
            email
        };

        Ok(email.to_string())
    }

    fn parse_rcpt_to(args: &str) -> Result<String> {
        // Expected format: TO:<email@domain.com>
        if !args.to_uppercase().starts_with("TO:") {
            return Err(MailError::Syntax("Invalid RCPT TO syntax".to_string()));
        }

        let email = args[3..].trim();
        let email = if email.starts_with('<') && email.ends_with('>') {
            &email[1..email.len() - 1]
        } else {
            email
        };

        Ok(email.to_string())
    }
}
