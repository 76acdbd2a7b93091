// src/feed/normalize.rs
//! Item -> Entry mapping: field fallback chains, preview cleanup, media discovery.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::feed::error::MalformedItemError;
use crate::feed::types::{Entry, Field, Guid, Item, Media};
use crate::feed::{format_rfc2822, parse_feed_date};

pub const MAX_PREVIEW_CHARS: usize = 500;
const ELLIPSIS: &str = "...";

pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";
pub const DEFAULT_MEDIA_WIDTH: u32 = 800;
pub const DEFAULT_MEDIA_HEIGHT: u32 = 600;

// The site name may be wrapped in a link; the match ends at its full stop.
static RE_BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)The post\s.*?\sappeared first on\s(?:<[^>]*>|[^.<])*\.?").unwrap()
});
static RE_FIRST_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:p|div)(?:\s[^>]*)?>(.*?)</(?:p|div)\s*>").unwrap());
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)</?[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Wrap the cleaned preview in a single `<p>`.
    pub wrap_preview_in_paragraph: bool,
}

/// Map one parsed item to an entry. Fails only when `title` or `link` is missing.
pub fn normalize_item(item: &Item, opts: &NormalizeOptions) -> Result<Entry, MalformedItemError> {
    let title = item.text("title").ok_or(MalformedItemError { field: "title" })?;
    let link = item.link().ok_or(MalformedItemError { field: "link" })?;

    let summary = item
        .text("summary")
        .or_else(|| item.text("atom:summary"))
        .or_else(|| item.text("itunes:summary"));
    let raw_description = item.text("description");

    let mut description = clean_description(summary.or(raw_description).unwrap_or_default());
    if opts.wrap_preview_in_paragraph && !description.is_empty() {
        description = format!("<p>{description}</p>");
    }

    let content = item
        .text("content:encoded")
        .or(summary)
        .or(raw_description)
        .unwrap_or_default()
        .to_string();

    let published = item
        .text("pubDate")
        .or_else(|| item.text("dc:date"))
        .and_then(parse_feed_date)
        .map(format_rfc2822);

    let creator = item
        .text("dc:creator")
        .or_else(|| item.text("author"))
        .map(str::to_string);

    let categories = item
        .fields_named("category")
        .filter_map(Field::text)
        .map(str::to_string)
        .collect();

    let guid = match item.text("guid") {
        Some(value) => Guid {
            value: value.to_string(),
            is_permalink: value == link,
        },
        None => Guid {
            value: link.to_string(),
            is_permalink: true,
        },
    };

    let media = extract_media(item, &content);

    Ok(Entry {
        title: title.to_string(),
        link: link.to_string(),
        description,
        content,
        published,
        creator,
        categories,
        guid,
        media,
    })
}

/// Normalize a batch, dropping malformed items. Returns the entries and the
/// number of items dropped.
pub fn normalize_all(items: &[&Item], opts: &NormalizeOptions) -> (Vec<Entry>, usize) {
    let mut dropped = 0usize;
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match normalize_item(item, opts) {
            Ok(entry) => out.push(entry),
            Err(e) => {
                dropped += 1;
                warn!(error = %e, index = idx, link = item.link().unwrap_or_default(), "dropping malformed item");
            }
        }
    }
    (out, dropped)
}

/// Turn an upstream description into a short plain-text preview.
pub fn clean_description(raw: &str) -> String {
    // 1) Trailing "The post X appeared first on Y." boilerplate
    let text = RE_BOILERPLATE.replace(raw, "");

    // 2) Markup: keep only the first <p>/<div> block when the text opens with
    //    one, then drop every remaining tag and decode entities
    let block = if text.trim_start().starts_with('<') {
        RE_FIRST_BLOCK
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    } else {
        None
    };
    let stripped = RE_TAGS.replace_all(block.unwrap_or(&text), " ");
    let text = html_escape::decode_html_entities(&stripped).into_owned();

    // 3) Collapse whitespace
    let text = RE_WS.replace_all(&text, " ");
    let text = text.trim();

    // 4) Length cap on code points
    truncate_chars(text, MAX_PREVIEW_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Structured media first (`media:content`, image `enclosure`); otherwise
/// `<img src>` found in the content.
pub fn extract_media(item: &Item, content: &str) -> Vec<Media> {
    let mut media: Vec<Media> = Vec::new();

    for field in &item.fields {
        let is_enclosure = match field.name.as_str() {
            "media:content" => false,
            "enclosure" => true,
            _ => continue,
        };
        let Some(url) = field.attr("url").map(str::trim).filter(|u| u.starts_with("http")) else {
            continue;
        };
        let mime_type = match (field.attr("type"), field.attr("medium")) {
            (Some(t), _) if !t.trim().is_empty() => t.trim().to_string(),
            (_, Some("video")) => "video/mp4".to_string(),
            _ => DEFAULT_MEDIA_TYPE.to_string(),
        };
        if is_enclosure && !mime_type.starts_with("image/") {
            continue;
        }
        push_unique(
            &mut media,
            Media {
                url: url.to_string(),
                mime_type,
                width: dimension(field.attr("width")).unwrap_or(DEFAULT_MEDIA_WIDTH),
                height: dimension(field.attr("height")).unwrap_or(DEFAULT_MEDIA_HEIGHT),
            },
        );
    }

    if media.is_empty() {
        for caps in RE_IMG_SRC.captures_iter(content) {
            let Some(src) = caps.get(1) else { continue };
            let url = html_escape::decode_html_entities(src.as_str().trim()).into_owned();
            if url.starts_with("http") {
                push_unique(
                    &mut media,
                    Media {
                        url,
                        mime_type: DEFAULT_MEDIA_TYPE.to_string(),
                        width: DEFAULT_MEDIA_WIDTH,
                        height: DEFAULT_MEDIA_HEIGHT,
                    },
                );
            }
        }
    }

    media
}

fn push_unique(media: &mut Vec<Media>, m: Media) {
    if !media.iter().any(|x| x.url == m.url) {
        media.push(m);
    }
}

fn dimension(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok()).filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::TextValue;

    fn field(name: &str, value: &str) -> Field {
        Field {
            name: name.into(),
            attrs: vec![],
            value: Some(TextValue::CData(value.into())),
        }
    }

    #[test]
    fn boilerplate_is_stripped() {
        assert_eq!(
            clean_description("Great story. The post Foo appeared first on Bar."),
            "Great story."
        );
    }

    #[test]
    fn wordpress_markup_uses_first_paragraph() {
        let raw = "<p>Baghdad &#8211; talks   resumed\n today.</p>\n<p>The post <a href=\"https://x/a\">A</a> appeared first on <a href=\"https://x\">X News</a>.</p>";
        assert_eq!(clean_description(raw), "Baghdad \u{2013} talks resumed today.");
    }

    #[test]
    fn markup_without_block_is_stripped_with_spaces() {
        assert_eq!(clean_description("<b>one</b><i>two</i>"), "one two");
    }

    #[test]
    fn boilerplate_stops_at_end_of_sentence() {
        assert_eq!(
            clean_description("Great story. The post Foo appeared first on Bar. More follows."),
            "Great story. More follows."
        );
        assert_eq!(
            clean_description(
                "Lead. The post <a href=\"https://www.x.com/a\">A</a> appeared first on \
                 <a href=\"https://www.x.com\">X News</a>. Tail."
            ),
            "Lead. Tail."
        );
    }

    #[test]
    fn inline_tags_after_leading_text_are_stripped() {
        assert_eq!(
            clean_description("Read <b>this</b> &amp; that"),
            "Read this & that"
        );
    }

    #[test]
    fn truncation_never_cuts_into_a_tag() {
        let raw = format!(
            "Intro {}<a href=\"https://example.com/very/long/path\">link</a> tail",
            "word ".repeat(98)
        );
        let out = clean_description(&raw);
        assert!(!out.contains('<'), "markup left in {out:?}");
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), MAX_PREVIEW_CHARS);

        let long = format!("{}<b>bold</b>", "x ".repeat(300));
        let out = clean_description(&long);
        assert_eq!(out.chars().count(), MAX_PREVIEW_CHARS);
        assert!(out.ends_with("..."));
        assert!(!out.contains('<'));
    }

    #[test]
    fn truncates_on_code_points() {
        let long = "é".repeat(600);
        let out = clean_description(&long);
        assert_eq!(out.chars().count(), 500);
        assert!(out.ends_with("..."));
        assert_eq!(clean_description(&"x".repeat(500)).chars().count(), 500);
    }

    #[test]
    fn content_falls_back_to_description() {
        let item = Item {
            fields: vec![
                field("title", "T"),
                field("link", "https://x/iraq/1"),
                field("description", "<p>Body text</p>"),
            ],
        };
        let entry = normalize_item(&item, &NormalizeOptions::default()).unwrap();
        assert_eq!(entry.description, "Body text");
        assert_eq!(entry.content, "<p>Body text</p>");
        assert!(entry.guid.is_permalink);
    }

    #[test]
    fn wrap_option_adds_paragraph() {
        let item = Item {
            fields: vec![
                field("title", "T"),
                field("link", "https://x/iraq/1"),
                field("description", "Short"),
            ],
        };
        let opts = NormalizeOptions {
            wrap_preview_in_paragraph: true,
        };
        assert_eq!(normalize_item(&item, &opts).unwrap().description, "<p>Short</p>");
    }

    #[test]
    fn missing_title_is_malformed() {
        let item = Item {
            fields: vec![field("link", "https://x/iraq/1")],
        };
        assert_eq!(
            normalize_item(&item, &NormalizeOptions::default()),
            Err(MalformedItemError { field: "title" })
        );
    }

    #[test]
    fn img_scan_only_accepts_http_urls() {
        let item = Item::default();
        let media = extract_media(
            &item,
            r#"<img src="https://cdn/x.jpg?a=1&amp;b=2"><img src="/rel.png"><img alt="" src='http://cdn/y.png'>"#,
        );
        let urls: Vec<_> = media.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, vec!["https://cdn/x.jpg?a=1&b=2", "http://cdn/y.png"]);
        assert!(media
            .iter()
            .all(|m| m.mime_type == "image/jpeg" && m.width == 800 && m.height == 600));
    }

    #[test]
    fn structured_media_wins_over_img_scan() {
        let item = Item {
            fields: vec![Field {
                name: "media:content".into(),
                attrs: vec![
                    ("url".into(), "https://cdn/m.png".into()),
                    ("type".into(), "image/png".into()),
                    ("width".into(), "1024".into()),
                ],
                value: None,
            }],
        };
        let media = extract_media(&item, r#"<img src="https://cdn/other.jpg">"#);
        assert_eq!(
            media,
            vec![Media {
                url: "https://cdn/m.png".into(),
                mime_type: "image/png".into(),
                width: 1024,
                height: 600,
            }]
        );
    }
}
