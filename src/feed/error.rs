use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Document parsed, but nothing resembling `<channel>` was found.
    #[error("no <channel> element found in feed")]
    NoChannel,

    /// Input is not a recognizable XML document at all.
    #[error("feed is not a recognizable XML document: {0}")]
    Structural(String),
}

/// A single item lacks a field the normalized entry requires.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("item is missing required field `{field}`")]
pub struct MalformedItemError {
    pub field: &'static str,
}

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("xml write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml write failed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("serialized output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("CDATA section missing for {expected} entries (found {found})")]
    CDataLost { expected: usize, found: usize },
}
