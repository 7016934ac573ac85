use thiserror::Error;

/// Errors surfaced by the SMTP core.
///
/// The session dispatcher matches on variant to pick the SMTP reply code
/// (see `smtp::session`); the detail string becomes the reply text.
#[derive(Error, Debug)]
pub enum MailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed command line or MAIL/RCPT path syntax. -> 501
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Command arrived outside its allowed sequence. -> 503
    #[error("bad sequence of commands: {0}")]
    OutOfOrder(String),

    /// `secure` is set and the client has not authenticated yet. -> 503
    #[error("authentication required")]
    AuthRequired,

    /// SASL credential or HMAC response didn't match. -> 535
    #[error("invalid credential")]
    InvalidCredential,

    /// PLAIN/LOGIN attempted before STARTTLS. -> 538
    #[error("TLS required")]
    TlsRequired,

    /// Collaborator or decode failure during AUTH. -> 454
    #[error("temporary authentication failure: {0}")]
    AuthServer(String),

    #[error("MIME decomposition error: {0}")]
    Mime(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, MailError>;
