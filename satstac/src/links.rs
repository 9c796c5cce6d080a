//! Hyperlinks between catalog nodes.
//!
//! Links are the only relational structure of a record: zero-or-one `root`
//! and `parent`, exactly one `self`, and any number of `child`/`item` links.
//! Hrefs may be relative; they are resolved against the `self` href.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use url::Url;

use crate::Collection;

/// Link relation type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum Rel {
    SelfLink,
    Root,
    Parent,
    Child,
    Item,
    Other(String),
}

impl Display for Rel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::SelfLink => "self",
            Self::Root => "root",
            Self::Parent => "parent",
            Self::Child => "child",
            Self::Item => "item",
            Self::Other(v) => v,
        })
    }
}

impl FromStr for Rel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "self" => Self::SelfLink,
            "root" => Self::Root,
            "parent" => Self::Parent,
            "child" => Self::Child,
            "item" => Self::Item,
            v => Self::Other(v.to_string()),
        })
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Link {
    pub rel: Rel,
    pub href: String,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Link {
    #[must_use]
    pub fn new(rel: Rel, href: impl Into<String>) -> Self {
        Self {
            rel,
            href: href.into(),
            other: BTreeMap::new(),
        }
    }
}

impl Collection {
    pub fn links_by_rel<'a, 'b>(&'a self, rel: &'b Rel) -> impl Iterator<Item = &'a Link> + use<'a, 'b> {
        self.links.iter().filter(move |l| &l.rel == rel)
    }

    fn first_href(&self, rel: &Rel) -> Option<&str> {
        self.links_by_rel(rel).next().map(|l| l.href.as_str())
    }

    #[must_use]
    pub fn self_href(&self) -> Option<&str> {
        self.first_href(&Rel::SelfLink)
    }

    #[must_use]
    pub fn root_href(&self) -> Option<&str> {
        self.first_href(&Rel::Root)
    }

    #[must_use]
    pub fn parent_href(&self) -> Option<&str> {
        self.first_href(&Rel::Parent)
    }

    /// Hrefs of `child` and `item` links, in document order.
    #[must_use]
    pub fn child_hrefs(&self) -> Vec<&str> {
        self.links
            .iter()
            .filter(|l| matches!(l.rel, Rel::Child | Rel::Item))
            .map(|l| l.href.as_str())
            .collect()
    }

    /// Resolve an href of this record against its `self` href.
    /// Without a `self` link the href is returned unchanged.
    #[must_use]
    pub fn resolve(&self, href: &str) -> String {
        match self.self_href() {
            Some(base) => resolve_href(base, href),
            None => href.to_string(),
        }
    }

    /// True when `root` and `self` point to the same document.
    #[must_use]
    pub fn is_root(&self) -> bool {
        match (self.self_href(), self.root_href()) {
            (Some(slf), Some(root)) => resolve_href(slf, slf) == resolve_href(slf, root),
            _ => false,
        }
    }
}

/// Resolve `href` relative to the document at `base`.
///
/// Absolute URLs are returned as-is. When `base` is a URL, standard URL
/// joining rules apply. Otherwise `base` is a filesystem path and `href` is
/// joined to its directory, with `.` and `..` collapsed lexically.
#[must_use]
pub fn resolve_href(base: &str, href: &str) -> String {
    if let Ok(url) = Url::parse(href) {
        return url.to_string();
    }
    if let Ok(base) = Url::parse(base) {
        if let Ok(url) = base.join(href) {
            return url.to_string();
        }
    }
    let dir = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    normalize(&dir.join(href)).to_string_lossy().into_owned()
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::collection::tests::landsat;

    #[rstest]
    #[case("self", Rel::SelfLink)]
    #[case("root", Rel::Root)]
    #[case("parent", Rel::Parent)]
    #[case("child", Rel::Child)]
    #[case("item", Rel::Item)]
    #[case("license", Rel::Other("license".to_string()))]
    fn rel_roundtrip(#[case] value: &str, #[case] rel: Rel) {
        assert_eq!(value.parse::<Rel>().unwrap(), rel);
        assert_eq!(rel.to_string(), value);
        let json = serde_json::to_string(&Link::new(rel.clone(), "x")).unwrap();
        assert_eq!(json, format!(r#"{{"rel":"{value}","href":"x"}}"#));
    }

    #[rstest]
    #[case(
        "https://example.com/a/b/catalog.json",
        "../catalog.json",
        "https://example.com/a/catalog.json"
    )]
    #[case(
        "https://example.com/a/catalog.json",
        "./2018/item.json",
        "https://example.com/a/2018/item.json"
    )]
    #[case(
        "https://example.com/a/catalog.json",
        "s3://bucket/catalog.json",
        "s3://bucket/catalog.json"
    )]
    #[case("data/a/catalog.json", "../catalog.json", "data/catalog.json")]
    #[case("data/a/catalog.json", "./b/item.json", "data/a/b/item.json")]
    #[case("catalog.json", "../up.json", "../up.json")]
    #[case("/abs/catalog.json", "../../x.json", "/x.json")]
    fn resolve(#[case] base: &str, #[case] href: &str, #[case] expected: &str) {
        assert_eq!(resolve_href(base, href), expected);
    }

    #[test]
    fn landsat_links() {
        let col = landsat();
        assert_eq!(
            col.self_href(),
            Some("https://sat-stac.s3.amazonaws.com/landsat-8-l1/catalog.json")
        );
        assert_eq!(col.root_href(), Some("../catalog.json"));
        assert_eq!(
            col.resolve(col.parent_href().unwrap()),
            "https://sat-stac.s3.amazonaws.com/catalog.json"
        );
        assert_eq!(col.child_hrefs().len(), 2);
        assert!(!col.is_root());
        assert_eq!(col.links_by_rel(&Rel::SelfLink).count(), 1);
    }

    #[test]
    fn root_coincides_with_self() {
        let mut col = landsat();
        col.links = vec![
            Link::new(Rel::SelfLink, "/data/catalog.json"),
            Link::new(Rel::Root, "./catalog.json"),
        ];
        assert!(col.is_root());
    }
}
