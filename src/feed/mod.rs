// src/feed/mod.rs
//! Feed transform: parse -> filter -> normalize -> serialize.

pub mod error;
pub mod filter;
pub mod normalize;
pub mod parse;
pub mod serialize;
pub mod types;

use chrono::{DateTime, Utc};

pub use error::{MalformedItemError, ParseError, SerializeError};
pub use filter::{filter_items, LinkPredicate, SubstringPredicate};
pub use normalize::{clean_description, normalize_all, normalize_item, NormalizeOptions};
pub use parse::{parse_feed, parse_str, ParsedFeed};
pub use serialize::{serialize_feed, SerializeOptions};
pub use types::{Channel, Entry, Field, Guid, Item, Media, OutputDocument, RawFeed, TextValue};

/// Parse an item/channel date: RFC 2822 first (`pubDate`), then RFC 3339 (`dc:date`).
pub fn parse_feed_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// RFC 2822 in UTC with a literal `+0000` offset.
pub fn format_rfc2822(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_normalize_to_utc_rfc2822() {
        let dt = parse_feed_date("Tue, 14 Oct 2025 09:30:00 +0300").unwrap();
        assert_eq!(format_rfc2822(dt), "Tue, 14 Oct 2025 06:30:00 +0000");

        let dt = parse_feed_date("2025-10-14T06:30:00Z").unwrap();
        assert_eq!(format_rfc2822(dt), "Tue, 14 Oct 2025 06:30:00 +0000");

        assert!(parse_feed_date("yesterday").is_none());
    }
}
