//! Recursive MIME decomposition (RFC 2045/2046/2183)
//!
//! Grounded on the original `storage/mime.go::processMailContent` algorithm:
//! `multipart/mixed` recurses into `multipart/related` (body + embedded) and
//! `multipart/alternative` (preferred body + alternatives), classifying
//! everything else by `Content-Disposition`.

use super::types::{Content, Disposition, Mail};
use crate::error::{MailError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::collections::HashMap;
use tracing::warn;

/// Bounds recursion on maliciously nested multiparts.
const MAX_NESTING_DEPTH: usize = 8;

struct RawPart {
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

pub struct MimeParser;

impl MimeParser {
    /// Parse raw RFC 5322 message bytes (headers + body) into a `Mail`.
    pub fn parse(message: &[u8]) -> Result<Mail> {
        let (header_bytes, body) = split_headers_body(message);
        let headers = parse_headers(&String::from_utf8_lossy(&header_bytes));

        let mut mail = Mail {
            subject: headers.get("subject").cloned(),
            from: headers.get("from").cloned(),
            reply_to: headers.get("reply-to").cloned(),
            message_id: headers.get("message-id").cloned(),
            date: headers.get("date").cloned(),
            to: headers
                .get("to")
                .map(|v| split_address_list(v))
                .unwrap_or_default(),
            ..Default::default()
        };

        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "text/plain".to_string());
        let (media_type, params) = parse_content_type(&content_type);

        if let Some(boundary) = params.get("boundary") {
            let raw_parts = split_multipart(&body, boundary);
            match media_type.as_str() {
                "multipart/mixed" => Self::process_multipart_mixed(&mut mail, raw_parts, 1)?,
                "multipart/related" => {
                    let (body_content, embedded) = Self::process_multipart_related(raw_parts, 1)?;
                    mail.body = Some(body_content);
                    mail.embedded = embedded;
                }
                "multipart/alternative" => {
                    let (body_content, alternatives) =
                        Self::process_multipart_alternative(raw_parts, 1)?;
                    mail.body = Some(body_content);
                    mail.alternatives = alternatives;
                }
                other => return Err(MailError::Mime(format!("unsupported multipart subtype: {other}"))),
            }
        } else {
            let encoding = headers
                .get("content-transfer-encoding")
                .cloned()
                .unwrap_or_default();
            let data = decode_transfer(&body, &encoding);
            mail.body = Some(Content {
                content_type: media_type,
                encoding: encoding.to_uppercase(),
                data,
                disposition: Disposition::Main,
                name: None,
            });
        }

        Ok(mail)
    }

    fn process_multipart_mixed(mail: &mut Mail, parts: Vec<RawPart>, depth: usize) -> Result<()> {
        check_depth(depth)?;

        for part in parts {
            let content_type = part
                .headers
                .get("content-type")
                .cloned()
                .unwrap_or_else(|| "text/plain".to_string());
            let (media_type, params) = parse_content_type(&content_type);

            if media_type == "multipart/related" {
                let boundary = params
                    .get("boundary")
                    .ok_or_else(|| MailError::Mime("multipart/related without boundary".into()))?;
                let nested = split_multipart(&part.body, boundary);
                let (body_content, embedded) = Self::process_multipart_related(nested, depth + 1)?;
                if mail.body.is_none() {
                    mail.body = Some(body_content);
                    mail.embedded = embedded;
                } else {
                    mail.attachments.push(body_content);
                    mail.attachments.extend(embedded);
                }
                continue;
            }

            if media_type == "multipart/alternative" {
                let boundary = params.get("boundary").ok_or_else(|| {
                    MailError::Mime("multipart/alternative without boundary".into())
                })?;
                let nested = split_multipart(&part.body, boundary);
                let (body_content, alternatives) =
                    Self::process_multipart_alternative(nested, depth + 1)?;
                if mail.body.is_none() {
                    mail.body = Some(body_content);
                    mail.alternatives = alternatives;
                } else {
                    mail.attachments.push(body_content);
                    mail.attachments.extend(alternatives);
                }
                continue;
            }

            let disposition_header = part.headers.get("content-disposition").cloned();
            let (disp_kind, disp_params) = disposition_header
                .as_deref()
                .map(parse_disposition)
                .unwrap_or((None, HashMap::new()));
            let encoding = part
                .headers
                .get("content-transfer-encoding")
                .cloned()
                .unwrap_or_default();
            let data = decode_transfer(&part.body, &encoding);
            let name = disp_params
                .get("filename")
                .cloned()
                .or_else(|| params.get("name").cloned());

            match disp_kind.as_deref() {
                Some("attachment") => {
                    let name = name.ok_or_else(|| {
                        MailError::Mime("attachment part has no derivable filename".into())
                    })?;
                    mail.attachments.push(Content {
                        content_type: media_type,
                        encoding: encoding.to_uppercase(),
                        data,
                        disposition: Disposition::Attachment,
                        name: Some(name),
                    });
                }
                Some("inline") => {
                    let content = Content {
                        content_type: media_type,
                        encoding: encoding.to_uppercase(),
                        data,
                        disposition: Disposition::Inline,
                        name,
                    };
                    if mail.body.is_some() {
                        mail.embedded.push(content);
                    } else {
                        mail.attachments.push(content);
                    }
                }
                _ => {
                    if mail.body.is_none()
                        && (media_type == "text/plain" || media_type == "text/html")
                    {
                        mail.body = Some(Content {
                            content_type: media_type,
                            encoding: encoding.to_uppercase(),
                            data,
                            disposition: Disposition::Main,
                            name: None,
                        });
                    } else {
                        mail.attachments.push(Content {
                            content_type: media_type,
                            encoding: encoding.to_uppercase(),
                            data,
                            disposition: Disposition::Attachment,
                            name,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn process_multipart_related(parts: Vec<RawPart>, depth: usize) -> Result<(Content, Vec<Content>)> {
        check_depth(depth)?;

        let mut body = None;
        let mut embedded = Vec::new();

        for part in parts {
            let content_type = part
                .headers
                .get("content-type")
                .cloned()
                .unwrap_or_else(|| "text/plain".to_string());
            let (media_type, _params) = parse_content_type(&content_type);

            if media_type.starts_with("multipart/") {
                return Err(MailError::Mime(
                    "nested multipart inside multipart/related".into(),
                ));
            }

            let encoding = part
                .headers
                .get("content-transfer-encoding")
                .cloned()
                .unwrap_or_default();
            let data = decode_transfer(&part.body, &encoding);

            if body.is_none() && (media_type == "text/plain" || media_type == "text/html") {
                body = Some(Content {
                    content_type: media_type,
                    encoding: encoding.to_uppercase(),
                    data,
                    disposition: Disposition::Main,
                    name: None,
                });
            } else {
                let content_id = part
                    .headers
                    .get("content-id")
                    .map(|v| v.trim_matches(|c| c == '<' || c == '>').to_string());
                embedded.push(Content {
                    content_type: media_type,
                    encoding: encoding.to_uppercase(),
                    data,
                    disposition: Disposition::Inline,
                    name: content_id,
                });
            }
        }

        let body = body.ok_or_else(|| {
            MailError::Mime("multipart/related has no text/plain or text/html body part".into())
        })?;
        Ok((body, embedded))
    }

    fn process_multipart_alternative(
        parts: Vec<RawPart>,
        depth: usize,
    ) -> Result<(Content, Vec<Content>)> {
        check_depth(depth)?;

        let mut candidates = Vec::new();

        for part in parts {
            let content_type = part
                .headers
                .get("content-type")
                .cloned()
                .unwrap_or_else(|| "text/plain".to_string());
            let (media_type, params) = parse_content_type(&content_type);

            if media_type == "multipart/related" {
                let boundary = params.get("boundary").ok_or_else(|| {
                    MailError::Mime("multipart/related without boundary".into())
                })?;
                let nested = split_multipart(&part.body, boundary);
                let (body_content, _embedded) = Self::process_multipart_related(nested, depth + 1)?;
                candidates.push(body_content);
                continue;
            }

            if media_type == "multipart/mixed" {
                let boundary = params
                    .get("boundary")
                    .ok_or_else(|| MailError::Mime("multipart/mixed without boundary".into()))?;
                let nested = split_multipart(&part.body, boundary);
                let mut nested_mail = Mail::default();
                Self::process_multipart_mixed(&mut nested_mail, nested, depth + 1)?;
                if let Some(body_content) = nested_mail.body {
                    candidates.push(body_content);
                }
                continue;
            }

            let encoding = part
                .headers
                .get("content-transfer-encoding")
                .cloned()
                .unwrap_or_default();
            let data = decode_transfer(&part.body, &encoding);
            candidates.push(Content {
                content_type: media_type,
                encoding: encoding.to_uppercase(),
                data,
                disposition: Disposition::Alternative,
                name: None,
            });
        }

        if candidates.is_empty() {
            return Err(MailError::Mime("multipart/alternative has no parts".into()));
        }

        let preferred_idx = candidates
            .iter()
            .position(|c| c.content_type == "text/html")
            .unwrap_or(0);
        let mut preferred = candidates.remove(preferred_idx);
        preferred.disposition = Disposition::Main;
        for alt in &mut candidates {
            alt.disposition = Disposition::Alternative;
        }

        Ok((preferred, candidates))
    }
}

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(MailError::Mime(
            "maximum MIME nesting depth exceeded".into(),
        ));
    }
    Ok(())
}

fn decode_transfer(data: &[u8], encoding: &str) -> Vec<u8> {
    match encoding.trim().to_uppercase().as_str() {
        "BASE64" => {
            let cleaned: Vec<u8> = data
                .iter()
                .filter(|b| !b.is_ascii_whitespace())
                .copied()
                .collect();
            BASE64.decode(&cleaned).unwrap_or_else(|e| {
                warn!("invalid base64 part, passing through undecoded: {}", e);
                data.to_vec()
            })
        }
        "QUOTED-PRINTABLE" => {
            quoted_printable::decode(data, quoted_printable::ParseMode::Robust).unwrap_or_else(|e| {
                warn!("invalid quoted-printable part, passing through undecoded: {}", e);
                data.to_vec()
            })
        }
        "7BIT" | "8BIT" | "" => data.to_vec(),
        other => {
            warn!("unknown transfer encoding '{}', passing through", other);
            data.to_vec()
        }
    }
}

fn split_headers_body(data: &[u8]) -> (Vec<u8>, Vec<u8>) {
    if let Some(pos) = find_subslice(data, b"\r\n\r\n") {
        (data[..pos].to_vec(), data[pos + 4..].to_vec())
    } else if let Some(pos) = find_subslice(data, b"\n\n") {
        (data[..pos].to_vec(), data[pos + 2..].to_vec())
    } else {
        (data.to_vec(), Vec::new())
    }
}

/// Parses headers, honoring RFC 5322 folding (continuation lines start with
/// whitespace). Keys are lowercased for case-insensitive lookup.
fn parse_headers(headers_str: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let mut current: Option<(String, String)> = None;

    for line in headers_str.lines() {
        if (line.starts_with(' ') || line.starts_with('\t')) && current.is_some() {
            let (_, value) = current.as_mut().unwrap();
            value.push(' ');
            value.push_str(line.trim());
        } else if let Some(colon) = line.find(':') {
            if let Some((name, value)) = current.take() {
                headers.insert(name.to_lowercase(), value);
            }
            let name = line[..colon].trim().to_string();
            let value = line[colon + 1..].trim().to_string();
            current = Some((name, value));
        }
    }
    if let Some((name, value)) = current {
        headers.insert(name.to_lowercase(), value);
    }

    headers
}

fn parse_content_type(value: &str) -> (String, HashMap<String, String>) {
    let mut segments = value.split(';');
    let media_type = segments
        .next()
        .unwrap_or("text/plain")
        .trim()
        .to_lowercase();
    (media_type, parse_params(segments))
}

fn parse_disposition(value: &str) -> (Option<String>, HashMap<String, String>) {
    let mut segments = value.split(';');
    let kind = segments.next().map(|s| s.trim().to_lowercase());
    (kind, parse_params(segments))
}

fn parse_params<'a>(segments: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for segment in segments {
        let segment = segment.trim();
        if let Some(eq) = segment.find('=') {
            let key = segment[..eq].trim().to_lowercase();
            let value = segment[eq + 1..].trim().trim_matches('"').to_string();
            params.insert(key, value);
        }
    }
    params
}

fn split_address_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Splits a multipart body on `--boundary` delimiters. Stops at the closing
/// `--boundary--` delimiter; ignores preamble and epilogue text.
fn split_multipart(body: &[u8], boundary: &str) -> Vec<RawPart> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut delimiter_positions = Vec::new();
    let mut search_from = 0;

    while let Some(pos) = find_subslice(&body[search_from..], &delimiter) {
        let abs_pos = search_from + pos;
        delimiter_positions.push(abs_pos);
        search_from = abs_pos + delimiter.len();
    }

    let mut parts = Vec::new();
    for i in 0..delimiter_positions.len() {
        let after_delim = delimiter_positions[i] + delimiter.len();
        if body[after_delim..].starts_with(b"--") {
            break; // closing delimiter
        }
        let end = if i + 1 < delimiter_positions.len() {
            delimiter_positions[i + 1]
        } else {
            body.len()
        };

        let section = trim_newlines(&body[after_delim..end]);
        if section.is_empty() {
            continue;
        }

        let (header_bytes, part_body) = split_headers_body(section);
        let headers = parse_headers(&String::from_utf8_lossy(&header_bytes));
        parts.push(RawPart {
            headers,
            body: part_body,
        });
    }

    parts
}

fn trim_newlines(mut data: &[u8]) -> &[u8] {
    while data.starts_with(b"\r\n") {
        data = &data[2..];
    }
    while data.starts_with(b"\n") {
        data = &data[1..];
    }
    while data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    }
    while data.ends_with(b"\n") || data.ends_with(b"\r") {
        data = &data[..data.len() - 1];
    }
    data
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
