//! Maildir-backed receiver: parses the envelope's MIME content (surfacing
//! decomposition problems as warnings rather than rejecting already-accepted
//! mail) and persists the raw message per recipient using the Maildir
//! tmp/new/cur atomic-rename convention.

use super::Receiver;
use crate::envelope::Envelope;
use crate::error::{MailError, Result};
use crate::mime::MimeParser;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

pub struct MaildirReceiver {
    base_path: PathBuf,
}

impl MaildirReceiver {
    pub fn new(base_path: String) -> Self {
        Self {
            base_path: PathBuf::from(base_path),
        }
    }

    pub async fn store(&self, recipient: &str, data: &[u8]) -> Result<String> {
        let mailbox_path = self.base_path.join(recipient);
        self.ensure_maildir_structure(&mailbox_path).await?;

        let filename = generate_filename();
        let tmp_path = mailbox_path.join("tmp").join(&filename);
        let new_path = mailbox_path.join("new").join(&filename);

        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &new_path).await?;

        info!("stored message for {} as {}", recipient, new_path.display());
        Ok(filename)
    }

    async fn ensure_maildir_structure(&self, mailbox_path: &PathBuf) -> Result<()> {
        for subdir in &["tmp", "new", "cur"] {
            let dir = mailbox_path.join(subdir);
            if !dir.exists() {
                fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| MailError::Storage(format!("failed to create directory {dir:?}: {e}")))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Receiver for MaildirReceiver {
    async fn receive(&self, envelope: Envelope) -> Result<()> {
        match MimeParser::parse(&envelope.content) {
            Ok(mail) => info!(
                "decomposed message {}: subject={:?} attachments={} alternatives={} embedded={}",
                envelope.message_id,
                mail.subject,
                mail.attachments.len(),
                mail.alternatives.len(),
                mail.embedded.len()
            ),
            Err(e) => warn!("MIME decomposition failed for {}: {}", envelope.message_id, e),
        }

        for recipient in &envelope.recipients {
            self.store(recipient, &envelope.content).await?;
        }

        Ok(())
    }
}

fn generate_filename() -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let pid = std::process::id();
    let hostname = gethostname::gethostname().to_string_lossy().to_string();
    format!("{timestamp}.{pid}.{hostname}")
}
