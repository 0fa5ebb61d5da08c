//! Body extraction from the Gmail payload tree
//!
//! A payload is a tree of parts. The body is the first leaf, in depth-first
//! order, that holds `text/plain` data or `text/html` data (rendered to plain
//! text). Anything else yields [`BodyText::NoReadableContent`].

use tracing::debug;

/// Text shown to the classifier when a message has no readable body
pub const NO_READABLE_CONTENT: &str = "(No readable content)";

/// Wrap width handed to the HTML renderer; lines are joined afterwards
const RENDER_WIDTH: usize = 120;

/// One node of a message payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePart {
    pub mime_type: String,
    /// Decoded body bytes, if the part carries inline data
    pub data: Option<Vec<u8>>,
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    pub fn leaf(mime_type: &str, data: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: Some(data.to_vec()),
            parts: Vec::new(),
        }
    }

    pub fn multipart(mime_type: &str, parts: Vec<MessagePart>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: None,
            parts,
        }
    }
}

impl From<&google_gmail1::api::MessagePart> for MessagePart {
    fn from(part: &google_gmail1::api::MessagePart) -> Self {
        Self {
            mime_type: part.mime_type.clone().unwrap_or_default(),
            data: part
                .body
                .as_ref()
                .and_then(|b| b.data.clone())
                .filter(|d| !d.is_empty()),
            parts: part
                .parts
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(MessagePart::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyText {
    Plain(String),
    /// HTML already rendered to plain text
    Html(String),
    NoReadableContent,
}

impl BodyText {
    pub fn into_text(self) -> String {
        match self {
            BodyText::Plain(text) | BodyText::Html(text) => text,
            BodyText::NoReadableContent => NO_READABLE_CONTENT.to_string(),
        }
    }
}

/// Depth-first search for the first readable leaf
pub fn extract_body(part: &MessagePart) -> BodyText {
    if !part.parts.is_empty() {
        return part
            .parts
            .iter()
            .map(extract_body)
            .find(|body| *body != BodyText::NoReadableContent)
            .unwrap_or(BodyText::NoReadableContent);
    }

    let Some(data) = part.data.as_deref() else {
        return BodyText::NoReadableContent;
    };
    let text = String::from_utf8_lossy(data);

    match part.mime_type.to_ascii_lowercase().as_str() {
        "text/plain" => BodyText::Plain(text.into_owned()),
        "text/html" => match html_to_text(&text) {
            Some(rendered) => BodyText::Html(rendered),
            None => BodyText::NoReadableContent,
        },
        _ => BodyText::NoReadableContent,
    }
}

/// Render HTML to plain text on a single line
///
/// Returns `None` when the markup cannot be rendered.
pub fn html_to_text(html: &str) -> Option<String> {
    match html2text::from_read(html.as_bytes(), RENDER_WIDTH) {
        Ok(rendered) => Some(rendered.split_whitespace().collect::<Vec<_>>().join(" ")),
        Err(e) => {
            debug!("Failed to render HTML body: {}", e);
            None
        }
    }
}
