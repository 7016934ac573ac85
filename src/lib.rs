//! mailcore: a receiving SMTP/ESMTP server core
//!
//! Accepts mail deliveries from standard SMTP clients, decomposes their
//! MIME bodies, and hands the result to a storage collaborator.
//!
//! # Features
//!
//! - **SMTP session engine**: greeting, command sequencing, STARTTLS,
//!   SASL (PLAIN/LOGIN/CRAM-MD5), dot-stuffed DATA reception.
//! - **MIME decomposition**: recursive `multipart/*` parsing, transfer
//!   decoding, body/alternative/embedded/attachment classification.
//! - **Authentication service contract**: salted password verification and
//!   HMAC-MD5 challenge validation.
//!
//! # Example
//!
//! ```no_run
//! use mailcore::config::Config;
//! use mailcore::smtp::SmtpServer;
//! use mailcore::storage::{MaildirReceiver, Receiver};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let receiver: Arc<dyn Receiver> = Arc::new(MaildirReceiver::new(
//!         config.storage.maildir_path.clone(),
//!     ));
//!
//!     let server = mailcore::smtp::SmtpServer::with_security(config, receiver).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: configuration surface
//! - [`envelope`]: the accumulated SMTP transaction state
//! - [`error`]: error types and handling
//! - [`smtp`]: SMTP protocol engine and listener
//! - [`mime`]: MIME decomposition engine
//! - [`storage`]: receiver collaborators (maildir, printing)
//! - [`security`]: TLS and SASL authentication

pub mod config;
pub mod envelope;
pub mod error;
pub mod mime;
pub mod security;
pub mod smtp;
pub mod storage;

pub use config::Config;
pub use error::{MailError, Result};
