/// Classification of a decoded MIME part within the parsed `Mail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The preferred representation of the message.
    Main,
    /// A non-preferred representation from `multipart/alternative`.
    Alternative,
    /// An inline part referenced by `Content-ID` from `multipart/related`.
    Inline,
    /// A `Content-Disposition: attachment` part, or an unclassified part of
    /// `multipart/mixed`.
    Attachment,
}

/// A single decoded MIME part.
#[derive(Debug, Clone)]
pub struct Content {
    /// Media type, lowercased, parameters stripped (e.g. `text/html`).
    pub content_type: String,
    /// `Content-Transfer-Encoding`, upper-cased for matching.
    pub encoding: String,
    /// Decoded payload bytes.
    pub data: Vec<u8>,
    pub disposition: Disposition,
    /// Attachment filename, or the `Content-ID` for inline parts.
    pub name: Option<String>,
}

/// The structured result of MIME decomposition.
#[derive(Debug, Clone, Default)]
pub struct Mail {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub message_id: Option<String>,
    pub date: Option<String>,
    pub to: Vec<String>,
    pub body: Option<Content>,
    pub alternatives: Vec<Content>,
    pub embedded: Vec<Content>,
    pub attachments: Vec<Content>,
}
