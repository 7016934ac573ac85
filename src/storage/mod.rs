//! Receiver collaborators: consumers of a finalized `Envelope` at the end
//! of a successful `DATA` transaction.
//!
//! - [`maildir`]: parses the envelope's MIME content and persists it in
//!   Maildir format.
//! - [`printing`]: diagnostic receiver that logs the envelope and discards it.

pub mod maildir;
pub mod printing;

use crate::envelope::Envelope;
use crate::error::Result;
use async_trait::async_trait;

/// The receiver collaborator contract: one method accepting a finalized
/// envelope. Errors are logged by the implementation; the core has already
/// replied `250 OK` by the time this is called and does not surface
/// receiver failures to the client.
#[async_trait]
pub trait Receiver: Send + Sync {
    async fn receive(&self, envelope: Envelope) -> Result<()>;
}

pub use maildir::MaildirReceiver;
pub use printing::PrintingReceiver;
