//! Diagnostic receiver: logs the envelope and discards it. Named explicitly
//! alongside the Maildir receiver as one of the two expected implementations
//! of the receiver collaborator contract.

use super::Receiver;
use crate::envelope::Envelope;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

#[derive(Default)]
pub struct PrintingReceiver;

impl PrintingReceiver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Receiver for PrintingReceiver {
    async fn receive(&self, envelope: Envelope) -> Result<()> {
        info!(
            "message_id={} sender={} recipients={:?} bytes={}",
            envelope.message_id,
            envelope.sender,
            envelope.recipients,
            envelope.content.len()
        );
        println!(
            "--- message {} ---\nFrom: {}\nTo: {:?}\n{}\n--- end message ---",
            envelope.message_id,
            envelope.sender,
            envelope.recipients,
            String::from_utf8_lossy(&envelope.content)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_never_fails() {
        let receiver = PrintingReceiver::new();
        let envelope = Envelope {
            message_id: "<1@test>".to_string(),
            sender: "a@x".to_string(),
            recipients: vec!["b@y".to_string()],
            content: b"Subject: Hi\r\n\r\nhello\r\n".to_vec(),
        };
        receiver.receive(envelope).await.unwrap();
    }
}
