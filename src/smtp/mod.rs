//! SMTP server implementation (RFC 5321/5322, RFC 3207, RFC 4954)
//!
//! - [`server`]: listener accepting incoming connections
//! - [`session`]: per-connection SMTP session state machine
//! - [`commands`]: SMTP command parsing
//! - [`codec`]: wire-level line I/O, dot-stuffed DATA reader, STARTTLS upgrade

pub mod codec;
pub mod commands;
pub mod server;
pub mod session;

pub use commands::SmtpCommand;
pub use server::SmtpServer;
pub use session::SmtpSession;
