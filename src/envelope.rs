//! The envelope: the server-accumulated transaction state, distinct from
//! the MIME-parsed `Mail` that the storage collaborator produces from it.

/// A finalized SMTP transaction, handed to the receiver collaborator once
/// per successful `DATA`.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// `<nanotime@server-name>`, generated at session start and on RSET/STARTTLS.
    pub message_id: String,
    /// Reverse path from `MAIL FROM`, mailbox-only.
    pub sender: String,
    /// Forward paths from each `RCPT TO`, in order, duplicates preserved.
    pub recipients: Vec<String>,
    /// Raw RFC 5322 bytes from `DATA`, dot-stuffing reversed.
    pub content: Vec<u8>,
}
