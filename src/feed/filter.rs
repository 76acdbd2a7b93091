// src/feed/filter.rs
use crate::feed::types::Item;

pub const DEFAULT_LINK_FILTER: &str = "/iraq/";

/// Decides whether an item stays, looking only at its link.
pub trait LinkPredicate {
    fn matches(&self, link: &str) -> bool;
}

impl<F> LinkPredicate for F
where
    F: Fn(&str) -> bool,
{
    fn matches(&self, link: &str) -> bool {
        self(link)
    }
}

/// Case-insensitive substring match on the link (e.g. a topical slug like `/iraq/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringPredicate {
    needle: String,
}

impl SubstringPredicate {
    pub fn new(needle: &str) -> Self {
        Self {
            needle: needle.to_lowercase(),
        }
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }
}

impl Default for SubstringPredicate {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_FILTER)
    }
}

impl LinkPredicate for SubstringPredicate {
    fn matches(&self, link: &str) -> bool {
        link.to_lowercase().contains(&self.needle)
    }
}

/// Stable filter: keeps matching items in their original order.
/// Items without a non-empty `link` never match.
pub fn filter_items<'a, P>(items: &'a [Item], predicate: &P) -> Vec<&'a Item>
where
    P: LinkPredicate + ?Sized,
{
    items
        .iter()
        .filter(|item| item.link().is_some_and(|link| predicate.matches(link)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{Field, TextValue};

    fn item(link: Option<&str>) -> Item {
        Item {
            fields: link
                .map(|l| Field {
                    name: "link".into(),
                    attrs: vec![],
                    value: Some(TextValue::Plain(l.into())),
                })
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn keeps_order_and_identity() {
        let items = vec![
            item(Some("https://x/iraq/a")),
            item(Some("https://x/iran/b")),
            item(Some("https://x/IRAQ/c")),
        ];
        let kept = filter_items(&items, &SubstringPredicate::default());
        assert_eq!(kept.len(), 2);
        assert!(std::ptr::eq(kept[0], &items[0]));
        assert!(std::ptr::eq(kept[1], &items[2]));
    }

    #[test]
    fn missing_or_blank_link_never_matches() {
        let items = vec![item(None), item(Some("   "))];
        let always = |_: &str| true;
        assert!(filter_items(&items, &always).is_empty());
    }

    #[test]
    fn needle_is_case_insensitive() {
        let p = SubstringPredicate::new("/World/");
        assert!(p.matches("https://x/world/1"));
        assert!(!p.matches("https://x/worlds/1"));
    }
}
