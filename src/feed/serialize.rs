// src/feed/serialize.rs
//! RSS 2.0 writer.
//!
//! Text fields go through `Event::Text` (escaped); HTML-bearing fields go
//! through `Event::CData`, so CDATA is a property of the event, never a
//! string patch applied afterwards.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::feed::error::SerializeError;
use crate::feed::format_rfc2822;
use crate::feed::types::{Channel, Entry, OutputDocument};

pub const DEFAULT_GENERATOR: &str = "topic-feed-proxy";
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Declared on `<rss>` unconditionally; covers every prefix this writer emits.
pub const NAMESPACES: &[(&str, &str)] = &[
    ("content", "http://purl.org/rss/1.0/modules/content/"),
    ("wfw", "http://wellformedweb.org/CommentAPI/"),
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("atom", "http://www.w3.org/2005/Atom"),
    ("sy", "http://purl.org/rss/1.0/modules/syndication/"),
    ("slash", "http://purl.org/rss/1.0/modules/slash/"),
    ("media", "http://search.yahoo.com/mrss/"),
];

#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// Public URL of this feed, for `atom:link rel="self"`. Falls back to the
    /// upstream self link, then the channel link.
    pub self_link: Option<String>,
    pub generator: String,
    pub build_date: DateTime<Utc>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            self_link: None,
            generator: DEFAULT_GENERATOR.to_string(),
            build_date: Utc::now(),
        }
    }
}

pub fn serialize_feed(
    channel: &Channel,
    entries: &[Entry],
    opts: &SerializeOptions,
) -> Result<OutputDocument, SerializeError> {
    let mut out = XmlOut::new();
    out.w
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    for (prefix, uri) in NAMESPACES {
        let key = format!("xmlns:{prefix}");
        rss.push_attribute((key.as_str(), *uri));
    }
    out.w.write_event(Event::Start(rss))?;
    out.start("channel", &[])?;

    write_channel_head(&mut out, channel, opts)?;
    for entry in entries {
        write_entry(&mut out, entry)?;
    }

    out.end("channel")?;
    out.end("rss")?;

    let xml = String::from_utf8(out.w.into_inner())?;
    check_cdata(&xml, entries)?;
    Ok(OutputDocument::new(xml))
}

fn write_channel_head(
    out: &mut XmlOut,
    channel: &Channel,
    opts: &SerializeOptions,
) -> Result<(), SerializeError> {
    let self_link = opts
        .self_link
        .as_deref()
        .or(channel.self_link.as_deref())
        .or(channel.link.as_deref())
        .unwrap_or_default();

    out.text("title", channel.title.as_deref().unwrap_or_default())?;
    out.empty(
        "atom:link",
        &[
            ("href", self_link),
            ("rel", "self"),
            ("type", "application/rss+xml"),
        ],
    )?;
    out.text("link", channel.link.as_deref().unwrap_or_default())?;
    out.text("description", channel.description.as_deref().unwrap_or_default())?;
    out.text("lastBuildDate", &format_rfc2822(opts.build_date))?;
    out.text("language", channel.language.as_deref().unwrap_or(DEFAULT_LANGUAGE))?;
    if let Some(period) = channel.update_period.as_deref() {
        out.text("sy:updatePeriod", period)?;
    }
    if let Some(freq) = channel.update_frequency.as_deref() {
        out.text("sy:updateFrequency", freq)?;
    }
    out.text("generator", &opts.generator)?;

    if let Some(image) = &channel.image {
        out.start("image", &[])?;
        out.text("url", &image.url)?;
        out.text(
            "title",
            image.title.as_deref().or(channel.title.as_deref()).unwrap_or_default(),
        )?;
        out.text(
            "link",
            image.link.as_deref().or(channel.link.as_deref()).unwrap_or_default(),
        )?;
        out.end("image")?;
    }
    Ok(())
}

fn write_entry(out: &mut XmlOut, entry: &Entry) -> Result<(), SerializeError> {
    out.start("item", &[])?;
    out.text("title", &entry.title)?;
    out.text("link", &entry.link)?;
    if let Some(creator) = &entry.creator {
        out.text("dc:creator", creator)?;
    }
    if let Some(published) = &entry.published {
        out.text("pubDate", published)?;
    }
    for category in &entry.categories {
        out.text("category", category)?;
    }

    let permalink = if entry.guid.is_permalink { "true" } else { "false" };
    out.start("guid", &[("isPermaLink", permalink)])?;
    out.w
        .write_event(Event::Text(BytesText::new(&entry.guid.value)))?;
    out.end("guid")?;

    out.cdata("description", &entry.description)?;
    if !entry.content.is_empty() {
        out.cdata("content:encoded", &entry.content)?;
    }

    for m in &entry.media {
        let width = m.width.to_string();
        let height = m.height.to_string();
        let mut attrs = vec![
            ("url", m.url.as_str()),
            ("type", m.mime_type.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
        ];
        if m.is_image() {
            attrs.push(("medium", "image"));
        }
        out.empty("media:content", &attrs)?;
        if m.is_image() {
            out.empty(
                "media:thumbnail",
                &[
                    ("url", m.url.as_str()),
                    ("width", width.as_str()),
                    ("height", height.as_str()),
                ],
            )?;
        }
    }

    out.end("item")
}

/// Every entry carries a CDATA description; content adds one more.
fn check_cdata(xml: &str, entries: &[Entry]) -> Result<(), SerializeError> {
    let expected = entries.len() + entries.iter().filter(|e| !e.content.is_empty()).count();
    let found = xml.matches("<![CDATA[").count();
    if found < expected {
        return Err(SerializeError::CDataLost { expected, found });
    }
    Ok(())
}

struct XmlOut {
    w: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            w: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), SerializeError> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.w.write_event(Event::Start(el))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<(), SerializeError> {
        self.w.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), SerializeError> {
        let mut el = BytesStart::new(name);
        for attr in attrs {
            el.push_attribute(*attr);
        }
        self.w.write_event(Event::Empty(el))?;
        Ok(())
    }

    /// Escaped text element; empty text collapses to `<name/>`.
    fn text(&mut self, name: &str, text: &str) -> Result<(), SerializeError> {
        if text.is_empty() {
            return self.empty(name, &[]);
        }
        self.start(name, &[])?;
        self.w.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// CDATA element. `]]>` inside the text is split across two sections.
    fn cdata(&mut self, name: &str, text: &str) -> Result<(), SerializeError> {
        self.start(name, &[])?;
        let mut rest = text;
        while let Some(pos) = rest.find("]]>") {
            self.w
                .write_event(Event::CData(BytesCData::new(&rest[..pos + 2])))?;
            rest = &rest[pos + 2..];
        }
        self.w.write_event(Event::CData(BytesCData::new(rest)))?;
        self.end(name)
    }
}
