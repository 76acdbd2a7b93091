// src/feed/types.rs
use bytes::Bytes;

/// Raw upstream payload: bytes plus the charset the fetcher saw (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeed {
    pub source_url: String,
    pub bytes: Bytes,
    /// Charset label from `Content-Type` (e.g. "utf-8", "ISO-8859-1").
    pub encoding: Option<String>,
}

impl RawFeed {
    pub fn new(source_url: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            source_url: source_url.into(),
            bytes: bytes.into(),
            encoding: None,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// Text payload of a parsed element. CDATA is kept distinct so the
/// serializer re-wraps it instead of escaping it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextValue {
    Plain(String),
    CData(String),
}

impl TextValue {
    pub fn as_str(&self) -> &str {
        match self {
            TextValue::Plain(s) | TextValue::CData(s) => s,
        }
    }

    pub fn is_cdata(&self) -> bool {
        matches!(self, TextValue::CData(_))
    }
}

/// One child element of an `<item>` (or of `<channel>`), keyed by its
/// namespace-canonical name, e.g. `content:encoded` or `media:content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub value: Option<TextValue>,
}

impl Field {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed text content; `None` when absent or blank.
    pub fn text(&self) -> Option<&str> {
        self.value
            .as_ref()
            .map(|v| v.as_str().trim())
            .filter(|s| !s.is_empty())
    }
}

/// Parsed `<item>`: ordered fields as they appeared upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub fields: Vec<Field>,
}

impl Item {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| f.name == name)
    }

    /// First non-blank text among fields with this name.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .find_map(Field::text)
    }

    pub fn link(&self) -> Option<&str> {
        self.text("link")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelImage {
    pub url: String,
    pub title: Option<String>,
    pub link: Option<String>,
}

/// Feed-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub last_build_date: Option<String>,
    pub generator: Option<String>,
    /// `atom:link rel="self"` href.
    pub self_link: Option<String>,
    pub image: Option<ChannelImage>,
    pub update_period: Option<String>,
    pub update_frequency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub url: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl Media {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guid {
    pub value: String,
    pub is_permalink: bool,
}

/// Normalized item, ready for serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Full HTML body; falls back to summary, then description.
    pub content: String,
    /// RFC 2822, UTC.
    pub published: Option<String>,
    pub creator: Option<String>,
    pub categories: Vec<String>,
    pub guid: Guid,
    pub media: Vec<Media>,
}

/// Serialized RSS document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDocument(String);

impl OutputDocument {
    pub(crate) fn new(xml: String) -> Self {
        Self(xml)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Number of `<item>` elements in the document.
    pub fn item_count(&self) -> usize {
        self.0.matches("<item>").count()
    }
}
