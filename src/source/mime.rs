//! RFC 822 → `RawMessage` mapping via mail-parser.

use chrono::{DateTime, Utc};
use mail_parser::{HeaderValue, MessageParser};

use crate::source::RawMessage;

/// Parse a raw RFC 822 message. Returns `None` if the bytes are not a message.
pub fn parse_rfc822(raw: &[u8]) -> Option<RawMessage> {
    let parsed = MessageParser::default().parse(raw)?;

    let sender = extract_sender(&parsed);
    let subject = parsed.subject().unwrap_or_default().trim().to_string();
    let body_text = parsed
        .body_text(0)
        .map(|t| t.to_string())
        .unwrap_or_default();
    let body_html = parsed
        .body_html(0)
        .map(|h| h.to_string())
        .unwrap_or_default();

    let timestamp = parsed.date().map(|d| d.to_timestamp());
    let received_at = timestamp
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    let message_id = match parsed.message_id().and_then(RawMessage::normalize_id) {
        Some(id) => id,
        None => RawMessage::synthetic_id(
            &sender,
            &subject,
            &timestamp.map(|t| t.to_string()).unwrap_or_default(),
            &body_text,
        ),
    };

    Some(RawMessage {
        message_id,
        sender,
        subject,
        in_reply_to: header_text(&parsed, "In-Reply-To"),
        references: header_text(&parsed, "References"),
        thread_topic: header_text(&parsed, "Thread-Topic"),
        body_text,
        body_html,
        received_at,
    })
}

/// Rebuild a `Name <address>` sender string from the parsed `From` header.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    let Some(addr) = parsed.from().and_then(|a| a.first()) else {
        return String::new();
    };
    let name = addr.name().map(str::trim).unwrap_or_default();
    let address = addr.address().map(str::trim).unwrap_or_default();
    match (name.is_empty(), address.is_empty()) {
        (false, false) => format!("{name} <{address}>"),
        (true, false) => address.to_string(),
        (false, true) => name.to_string(),
        (true, true) => String::new(),
    }
}

/// Flatten a header to text. Missing or structured-but-empty headers give "".
fn header_text(parsed: &mail_parser::Message, name: &str) -> String {
    parsed
        .headers()
        .iter()
        .find(|h| h.name().eq_ignore_ascii_case(name))
        .map(|h| match h.value() {
            HeaderValue::Text(text) => text.trim().to_string(),
            HeaderValue::TextList(list) => list
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        })
        .unwrap_or_default()
}

/// Strip HTML tags, keeping block boundaries as line breaks.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                if matches!(name.as_str(), "br" | "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3") {
                    result.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => result.push(ch),
        }
    }

    let decoded = result
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    // Normalize whitespace within lines, drop blank runs
    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
