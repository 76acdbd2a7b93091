// src/feed/parse.rs
//! Tolerant RSS reader.
//!
//! Walks quick-xml events with end-name checks disabled and keeps its own
//! element stack, so unclosed optional elements are closed implicitly when an
//! ancestor ends. Element names are resolved through their namespace URI and
//! re-prefixed with a canonical prefix (`content:`, `dc:`, `media:` ...), so the
//! prefix an upstream feed picked does not matter.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use regex::Regex;
use tracing::{debug, warn};

use crate::feed::error::ParseError;
use crate::feed::types::{Channel, ChannelImage, Field, Item, RawFeed, TextValue};

/// Give up after this many syntax errors; whatever was read so far is kept.
const MAX_SYNTAX_ERRORS: usize = 32;

/// Namespace URI -> canonical prefix. `None` means "core RSS vocabulary",
/// which is addressed by local name only.
const KNOWN_NAMESPACES: &[(&str, Option<&str>)] = &[
    ("http://purl.org/rss/1.0/modules/content", Some("content")),
    ("http://purl.org/dc/elements/1.1", Some("dc")),
    ("http://www.w3.org/2005/Atom", Some("atom")),
    ("http://purl.org/rss/1.0/modules/syndication", Some("sy")),
    ("http://purl.org/rss/1.0/modules/slash", Some("slash")),
    ("http://search.yahoo.com/mrss", Some("media")),
    ("http://wellformedweb.org/CommentAPI", Some("wfw")),
    ("http://www.itunes.com/dtds/podcast-1.0.dtd", Some("itunes")),
    ("http://www.w3.org/1999/02/22-rdf-syntax-ns#", Some("rdf")),
    ("http://purl.org/rss/1.0", None),
    ("http://my.netscape.com/rdf/simple/0.9", None),
];

/// Output of the parser: channel metadata plus items in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub channel: Channel,
    pub items: Vec<Item>,
}

/// Decode and parse an upstream payload.
pub fn parse_feed(raw: &RawFeed) -> Result<ParsedFeed, ParseError> {
    let text = decode(raw);
    parse_str(&text)
}

/// Decode raw bytes to text using the declared charset, falling back to the
/// XML declaration, then UTF-8.
pub fn decode(raw: &RawFeed) -> Cow<'_, str> {
    let label = raw
        .encoding
        .clone()
        .or_else(|| sniff_declared_encoding(&raw.bytes))
        .map(|l| l.trim().to_ascii_lowercase());

    match label.as_deref() {
        None | Some("utf-8" | "utf8") => {
            let bytes = raw
                .bytes
                .strip_prefix(&b"\xEF\xBB\xBF"[..])
                .unwrap_or(&raw.bytes);
            String::from_utf8_lossy(bytes)
        }
        Some("iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" | "us-ascii" | "ascii") => {
            Cow::Owned(raw.bytes.iter().map(|&b| char::from(b)).collect())
        }
        Some(other) => {
            warn!(encoding = other, source = %raw.source_url, "unsupported charset, decoding as utf-8");
            String::from_utf8_lossy(&raw.bytes)
        }
    }
}

fn sniff_declared_encoding(bytes: &[u8]) -> Option<String> {
    static RE_DECL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"<\?xml[^>]*encoding\s*=\s*["']([A-Za-z0-9._-]+)["']"#).unwrap());
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    RE_DECL
        .captures(&head)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse an already-decoded document.
pub fn parse_str(xml: &str) -> Result<ParsedFeed, ParseError> {
    let xml = xml.trim_start_matches('\u{feff}');
    let start = xml
        .find('<')
        .ok_or_else(|| ParseError::Structural("document contains no markup".into()))?;

    let mut reader = NsReader::from_str(&xml[start..]);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.check_comments = false;
        config.expand_empty_elements = false;
    }

    let mut builder = FeedBuilder::default();
    let mut syntax_errors = 0usize;

    loop {
        let before = reader.buffer_position();
        match next_token(&mut reader) {
            Ok(Token::Eof) => break,
            Ok(token) => builder.apply(token),
            Err(e) => {
                syntax_errors += 1;
                warn!(error = %e, position = before, "recovering from xml syntax error");
                if reader.buffer_position() == before || syntax_errors > MAX_SYNTAX_ERRORS {
                    break;
                }
            }
        }
    }

    builder.finish(syntax_errors)
}

// ---------------------------------------------------------------------------
// Event -> owned token
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Token {
    Open(Element),
    Empty(Element),
    Close(String),
    Text(String),
    CData(String),
    Eof,
    Skip,
}

#[derive(Debug)]
struct Element {
    /// Namespace-canonical name.
    name: String,
    attrs: Vec<(String, String)>,
    /// Tag body as written (`p class="x"`), used to rebuild nested markup.
    raw: String,
}

fn next_token(reader: &mut NsReader<&[u8]>) -> quick_xml::Result<Token> {
    let token = match reader.read_resolved_event()? {
        (ns, Event::Start(e)) => Token::Open(element(&ns, &e)),
        (ns, Event::Empty(e)) => Token::Empty(element(&ns, &e)),
        (ns, Event::End(e)) => {
            let raw = String::from_utf8_lossy(e.name().as_ref()).into_owned();
            Token::Close(qualify(&ns, e.local_name().as_ref(), &raw))
        }
        (_, Event::Text(e)) => Token::Text(unescape_text(&e)),
        (_, Event::CData(e)) => Token::CData(String::from_utf8_lossy(&e).into_owned()),
        (_, Event::Eof) => Token::Eof,
        _ => Token::Skip,
    };
    Ok(token)
}

fn element(ns: &ResolveResult, e: &BytesStart) -> Element {
    let raw_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    Element {
        name: qualify(ns, e.local_name().as_ref(), &raw_name),
        attrs: attributes(e),
        raw: String::from_utf8_lossy(e).into_owned(),
    }
}

fn qualify(ns: &ResolveResult, local: &[u8], raw: &str) -> String {
    let local = String::from_utf8_lossy(local);
    match ns {
        ResolveResult::Bound(Namespace(uri)) => match canonical_prefix(uri) {
            Some(Some(prefix)) => format!("{prefix}:{local}"),
            Some(None) => local.into_owned(),
            None if raw.contains(':') => raw.to_string(),
            None => local.into_owned(),
        },
        // Undeclared prefixes are kept as written; many feeds forget xmlns:dc.
        _ => raw.to_string(),
    }
}

fn canonical_prefix(uri: &[u8]) -> Option<Option<&'static str>> {
    let uri = String::from_utf8_lossy(uri);
    let uri = uri.trim().trim_end_matches('/');
    KNOWN_NAMESPACES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(uri))
        .map(|(_, prefix)| *prefix)
}

fn attributes(e: &BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .filter(|a| {
            let key = a.key.as_ref();
            key != b"xmlns" && !key.starts_with(b"xmlns:")
        })
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = match a.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => {
                    html_escape::decode_html_entities(&String::from_utf8_lossy(&a.value))
                        .into_owned()
                }
            };
            (key, value)
        })
        .collect()
}

/// XML-unescape, falling back to HTML entity decoding for `&nbsp;` and friends.
fn unescape_text(e: &BytesText) -> String {
    match e.unescape() {
        Ok(t) => t.into_owned(),
        Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(e)).into_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tree assembly
// ---------------------------------------------------------------------------

struct FieldBuilder {
    name: String,
    attrs: Vec<(String, String)>,
    depth: usize,
    /// Unescaped text, used when the field stays plain.
    text: String,
    /// Same content with text re-escaped, used when child markup shows up.
    markup_text: String,
    cdata: bool,
    markup: bool,
}

impl FieldBuilder {
    fn new(name: String, attrs: Vec<(String, String)>, depth: usize) -> Self {
        Self {
            name,
            attrs,
            depth,
            text: String::new(),
            markup_text: String::new(),
            cdata: false,
            markup: false,
        }
    }

    fn push_text(&mut self, t: &str) {
        if self.cdata && !self.markup && t.trim().is_empty() {
            return;
        }
        self.text.push_str(t);
        self.markup_text.push_str(&html_escape::encode_text(t));
    }

    fn push_cdata(&mut self, t: &str) {
        if !self.cdata && !self.markup && self.text.trim().is_empty() {
            self.text.clear();
            self.markup_text.clear();
        }
        self.cdata = true;
        self.text.push_str(t);
        self.markup_text.push_str(t);
    }

    fn push_markup(&mut self, tag: &str) {
        self.markup = true;
        self.markup_text.push_str(tag);
    }

    fn finish(self) -> Field {
        let value = if self.markup {
            let t = self.markup_text.trim();
            let t = t
                .strip_prefix("&lt;![CDATA[")
                .and_then(|s| s.strip_suffix("]]&gt;"))
                .unwrap_or(t);
            Some(TextValue::CData(t.to_string()))
        } else if self.cdata {
            Some(TextValue::CData(self.text))
        } else {
            let t = self.text.trim();
            if t.is_empty() {
                None
            } else if let Some(inner) = unwrap_escaped_cdata(t) {
                Some(TextValue::CData(inner.to_string()))
            } else {
                Some(TextValue::Plain(t.to_string()))
            }
        };
        Field {
            name: self.name,
            attrs: self.attrs,
            value,
        }
    }
}

/// `&lt;![CDATA[...]]&gt;` arrives here already unescaped once.
fn unwrap_escaped_cdata(t: &str) -> Option<&str> {
    t.strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
}

#[derive(Default)]
struct FeedBuilder {
    stack: Vec<String>,
    elements_seen: usize,
    channel_depth: Option<usize>,
    channel_open: bool,
    channel_fields: Vec<Field>,
    /// Depth of the open `<item>` and its fields so far.
    item: Option<(usize, Vec<Field>)>,
    items: Vec<Item>,
    /// Transparent wrapper (`media:group`, channel `image`) and its depth.
    container: Option<(String, usize)>,
    field: Option<FieldBuilder>,
}

impl FeedBuilder {
    fn apply(&mut self, token: Token) {
        match token {
            Token::Open(el) => self.open(el, false),
            Token::Empty(el) => self.open(el, true),
            Token::Close(name) => self.close(&name),
            Token::Text(t) => {
                if let Some(field) = self.field.as_mut() {
                    field.push_text(&t);
                }
            }
            Token::CData(t) => {
                if let Some(field) = self.field.as_mut() {
                    field.push_cdata(&t);
                }
            }
            Token::Eof | Token::Skip => {}
        }
    }

    fn open(&mut self, el: Element, empty: bool) {
        self.elements_seen += 1;

        // An unclosed field ends where the next feed element begins.
        let item_depth = self.item.as_ref().map(|(d, _)| *d);
        if let Some(field_depth) = self.field.as_ref().map(|f| f.depth) {
            match item_depth {
                Some(d) if el.name == "item" => self.close_to(d),
                _ if el.name == "item" || is_feed_element(&el.name) => {
                    self.close_to(field_depth)
                }
                _ => {}
            }
        }

        if let Some(field) = self.field.as_mut() {
            let close = if empty { "/" } else { "" };
            field.push_markup(&format!("<{}{close}>", el.raw));
            if !empty {
                self.stack.push(el.name);
            }
            return;
        }

        self.stack.push(el.name.clone());
        let depth = self.stack.len();

        if el.name == "item" && self.item.is_none() {
            self.item = Some((depth, Vec::new()));
        } else if el.name == "channel" && self.channel_depth.is_none() {
            self.channel_depth = Some(depth);
            self.channel_open = true;
        } else if let Some(parent) = self.parent_depth() {
            if depth == parent + 1 {
                if self.is_container(&el.name) {
                    self.container = Some((el.name, depth));
                } else {
                    let name = match &self.container {
                        Some((c, _)) if c == "image" => format!("image/{}", el.name),
                        _ => el.name,
                    };
                    self.field = Some(FieldBuilder::new(name, el.attrs, depth));
                }
            }
        }

        if empty {
            self.close_to(depth);
        }
    }

    fn close(&mut self, name: &str) {
        match self.stack.iter().rposition(|n| n == name) {
            Some(idx) => self.close_to(idx + 1),
            None => {
                if let Some(field) = self.field.as_mut() {
                    field.push_markup(&format!("</{name}>"));
                } else {
                    debug!(element = name, "ignoring unmatched end tag");
                }
            }
        }
    }

    /// Pop every level at or below `depth`, innermost first.
    fn close_to(&mut self, depth: usize) {
        while self.stack.len() >= depth && depth > 0 {
            let level = self.stack.len();
            let Some(name) = self.stack.pop() else { break };
            self.end_level(level, &name);
        }
    }

    fn end_level(&mut self, level: usize, name: &str) {
        if let Some(field) = self.field.as_mut() {
            if level > field.depth {
                field.push_markup(&format!("</{name}>"));
                return;
            }
            if let Some(done) = self.field.take() {
                let done = done.finish();
                match self.item.as_mut() {
                    Some((_, fields)) => fields.push(done),
                    None => self.channel_fields.push(done),
                }
            }
            return;
        }

        if matches!(&self.container, Some((_, d)) if *d == level) {
            self.container = None;
        } else if matches!(&self.item, Some((d, _)) if *d == level) {
            if let Some((_, fields)) = self.item.take() {
                self.items.push(Item { fields });
            }
        } else if self.channel_depth == Some(level) {
            self.channel_open = false;
        }
    }

    /// Depth whose direct children become fields, if any.
    fn parent_depth(&self) -> Option<usize> {
        let base = match &self.item {
            Some((d, _)) => *d,
            None if self.channel_open => self.channel_depth?,
            None => return None,
        };
        match &self.container {
            Some((_, d)) if *d > base => Some(*d),
            _ => Some(base),
        }
    }

    fn is_container(&self, name: &str) -> bool {
        if self.container.is_some() {
            return false;
        }
        match self.item {
            Some(_) => name == "media:group",
            None => name == "image",
        }
    }

    fn finish(mut self, syntax_errors: usize) -> Result<ParsedFeed, ParseError> {
        self.close_to(1);

        if self.elements_seen == 0 {
            return Err(ParseError::Structural(format!(
                "no elements could be read ({syntax_errors} syntax errors)"
            )));
        }
        if self.channel_depth.is_none() {
            return Err(ParseError::NoChannel);
        }

        debug!(
            items = self.items.len(),
            syntax_errors, "parsed upstream feed"
        );

        Ok(ParsedFeed {
            channel: build_channel(&self.channel_fields),
            items: self.items,
        })
    }
}

/// Element names that are never HTML, so they cannot be markup inside a field.
fn is_feed_element(name: &str) -> bool {
    const FIELDS: &[&str] = &[
        "title",
        "link",
        "description",
        "guid",
        "pubDate",
        "category",
        "author",
        "comments",
        "enclosure",
        "lastBuildDate",
        "language",
        "generator",
    ];
    const PREFIXES: &[&str] = &[
        "dc:", "content:", "media:", "sy:", "atom:", "itunes:", "slash:", "wfw:",
    ];
    FIELDS.contains(&name) || PREFIXES.iter().any(|p| name.starts_with(p))
}

fn build_channel(fields: &[Field]) -> Channel {
    let text = |name: &str| -> Option<String> {
        fields
            .iter()
            .filter(|f| f.name == name)
            .find_map(Field::text)
            .map(str::to_string)
    };

    let self_link = fields
        .iter()
        .filter(|f| f.name == "atom:link")
        .find(|f| f.attr("rel") == Some("self"))
        .and_then(|f| f.attr("href"))
        .map(str::to_string);

    Channel {
        title: text("title"),
        link: text("link"),
        description: text("description"),
        language: text("language"),
        last_build_date: text("lastBuildDate"),
        generator: text("generator"),
        self_link,
        image: text("image/url").map(|url| ChannelImage {
            url,
            title: text("image/title"),
            link: text("image/link"),
        }),
        update_period: text("sy:updatePeriod"),
        update_frequency: text("sy:updateFrequency"),
    }
}
