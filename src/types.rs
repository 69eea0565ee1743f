use crate::errors::{AppError, AppResult};
use base64::alphabet::URL_SAFE;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;

/// Gmail emits url-safe base64, usually padded but not always.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn decode_body_data(data: &str) -> AppResult<Vec<u8>> {
    BODY_ENGINE
        .decode(data.trim_end())
        .map_err(|e| AppError::Decode(format!("invalid url-safe base64 body: {e}")))
}

/// A search hit. Only the id is needed to fetch the full message.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(default, rename = "threadId")]
    pub thread_id: Option<String>,
}

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

pub fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartBody {
    /// Still url-safe base64 encoded, decoded at extraction time.
    Inline(String),
    /// Bytes live on the server and need a second fetch.
    Remote { attachment_id: String },
    Empty,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafPart {
    pub mime_type: String,
    pub filename: Option<String>,
    pub body: PartBody,
    pub size: u64,
    pub headers: Vec<Header>,
}

impl LeafPart {
    pub fn is_attachment(&self) -> bool {
        self.headers.iter().any(|h| {
            h.name.eq_ignore_ascii_case("Content-Disposition")
                && h.value.to_ascii_lowercase().contains("attachment")
        })
    }
}

/// A node of a message body. Containers never carry renderable content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MimePart {
    Container {
        mime_type: String,
        children: Vec<MimePart>,
    },
    Leaf(LeafPart),
}

impl MimePart {
    pub fn mime_type(&self) -> &str {
        match self {
            MimePart::Container { mime_type, .. } => mime_type,
            MimePart::Leaf(leaf) => &leaf.mime_type,
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            MimePart::Container { children, .. } => children.iter().map(Self::leaf_count).sum(),
            MimePart::Leaf(_) => 1,
        }
    }
}

/// Owned snapshot of one fetched message, taken once and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FullMessage {
    pub id: String,
    pub headers: Vec<Header>,
    pub parts: Vec<MimePart>,
}

impl FullMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }
}

// Gmail REST wire shapes. Kept private to the crate; callers work with the
// tagged tree above.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessage {
    pub id: String,
    #[serde(default)]
    pub payload: Option<WirePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WirePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: WireBody,
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireAttachment {
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl WirePart {
    fn into_part(self) -> MimePart {
        if !self.parts.is_empty() {
            return MimePart::Container {
                mime_type: self.mime_type,
                children: self.parts.into_iter().map(WirePart::into_part).collect(),
            };
        }

        let body = match (self.body.data, self.body.attachment_id) {
            (Some(data), _) if !data.is_empty() => PartBody::Inline(data),
            (_, Some(id)) if !id.is_empty() => PartBody::Remote { attachment_id: id },
            _ => PartBody::Empty,
        };

        MimePart::Leaf(LeafPart {
            mime_type: self.mime_type,
            filename: self.filename.filter(|f| !f.is_empty()),
            body,
            size: self.body.size,
            headers: self.headers,
        })
    }
}

impl WireMessage {
    pub(crate) fn into_message(self) -> FullMessage {
        let Some(payload) = self.payload else {
            return FullMessage {
                id: self.id,
                headers: Vec::new(),
                parts: Vec::new(),
            };
        };

        let headers = payload.headers.clone();
        let parts = if payload.parts.is_empty() {
            // Single-part message: the payload itself is the only leaf.
            let has_body = payload.body.data.as_deref().is_some_and(|d| !d.is_empty())
                || payload.body.attachment_id.is_some();
            if has_body {
                vec![payload.into_part()]
            } else {
                Vec::new()
            }
        } else {
            payload.parts.into_iter().map(WirePart::into_part).collect()
        };

        FullMessage {
            id: self.id,
            headers,
            parts,
        }
    }
}

impl FullMessage {
    /// Parse a `format=full` message resource as returned by the Gmail API.
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let wire: WireMessage = serde_json::from_str(raw)
            .map_err(|e| AppError::Decode(format!("message resource: {e}")))?;
        Ok(wire.into_message())
    }
}
