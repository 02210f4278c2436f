//! CSS-selector implementation of [`PathLookup`] over a `scraper` DOM.
//!
//! Path expressions are plain CSS selectors, with an optional value suffix
//! on leaf expressions borrowed from scrapy's convention:
//!
//! * `div.pub h1 ::text`       — the concatenated text of each match
//! * `div.particulars a ::attr(href)` — an attribute of each match
//! * `div.pub h1`              — no suffix defaults to `::text`
//! * `::attr(id)` / `::text`   — empty selector reads the current node
//!   itself (CSS selectors cannot address "self"; xpath's `./@id` can)
//!
//! Node selection ([`PathLookup::nodes`]) takes a bare selector; a value
//! suffix there is a spec-authoring mistake and fails the field (the
//! extractor turns that into an absent marker, not an abort).
//!
//! Elements missing a requested attribute are skipped, matching the
//! behaviour of an xpath `@attr` step — the match list just gets shorter,
//! it does not grow `None` holes.

use std::marker::PhantomData;

use scraper::{ElementRef, Html, Selector};

use crate::error::PathError;
use crate::extract::PathLookup;

/// What a leaf path expression asks for from each matched element.
enum ValueTarget {
    Text,
    Attr(String),
}

/// A parsed leaf path: selector plus value target. `selector` is `None`
/// when the path is a bare suffix addressing the current node.
struct LeafPath {
    selector: Option<Selector>,
    target: ValueTarget,
}

/// CSS-selector path lookup. The lifetime ties extracted nodes to the
/// [`Html`] document they borrow from.
#[derive(Default)]
pub struct CssLookup<'a> {
    _marker: PhantomData<&'a Html>,
}

impl<'a> CssLookup<'a> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a> PathLookup for CssLookup<'a> {
    type Node = ElementRef<'a>;

    fn nodes(&self, node: &Self::Node, path: &str) -> Result<Vec<Self::Node>, PathError> {
        if split_suffix(path).is_some() {
            return Err(PathError::new(
                path,
                "node selection cannot take a ::text / ::attr suffix",
            ));
        }
        let selector = parse_selector(path)?;
        Ok(node.select(&selector).collect())
    }

    fn values(&self, node: &Self::Node, path: &str) -> Result<Vec<String>, PathError> {
        let leaf = parse_leaf(path)?;
        let matches: Vec<ElementRef<'a>> = match &leaf.selector {
            Some(selector) => node.select(selector).collect(),
            None => vec![*node],
        };

        Ok(match leaf.target {
            ValueTarget::Text => matches
                .iter()
                .map(|el| el.text().collect::<String>())
                .collect(),
            ValueTarget::Attr(name) => matches
                .iter()
                .filter_map(|el| el.value().attr(&name).map(|v| v.to_string()))
                .collect(),
        })
    }
}

/// Split `selector ::suffix` into its two halves, if a suffix is present.
fn split_suffix(path: &str) -> Option<(&str, &str)> {
    let idx = path.rfind("::")?;
    let suffix = path[idx + 2..].trim();
    // Only our two value suffixes count; anything else (e.g. a CSS
    // pseudo-element the caller really meant) stays part of the selector.
    if suffix == "text" || (suffix.starts_with("attr(") && suffix.ends_with(')')) {
        Some((path[..idx].trim_end(), suffix))
    } else {
        None
    }
}

fn parse_selector(selector: &str) -> Result<Selector, PathError> {
    Selector::parse(selector)
        .map_err(|e| PathError::new(selector, format!("invalid CSS selector: {e:?}")))
}

fn parse_leaf(path: &str) -> Result<LeafPath, PathError> {
    let (selector_str, target) = match split_suffix(path) {
        None => (path, ValueTarget::Text),
        Some((sel, "text")) => (sel, ValueTarget::Text),
        Some((sel, suffix)) => {
            // split_suffix guarantees the attr(...) shape here
            let name = &suffix["attr(".len()..suffix.len() - 1];
            if name.is_empty() {
                return Err(PathError::new(path, "::attr() needs an attribute name"));
            }
            (sel, ValueTarget::Attr(name.to_string()))
        }
    };

    let selector = if selector_str.trim().is_empty() {
        None
    } else {
        Some(parse_selector(selector_str)?)
    };

    Ok(LeafPath { selector, target })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract, FieldValue, SelectorSpec};

    const PAGE: &str = r#"
        <html><body>
          <article id="pub-1">
            <h1 class="entry-title">The Crown, 14 High Street, York</h1>
            <ul class="tags"><li>Freehold</li><li>Garden</li></ul>
            <div class="particulars"><a href="/pubs/the-crown.pdf">Details</a></div>
          </article>
          <article id="pub-2">
            <h1 class="entry-title">The Swan, 3 Mill Lane, Leeds</h1>
            <ul class="tags"><li>Leasehold</li></ul>
            <div class="particulars"><a href="/pubs/the-swan.pdf">Details</a></div>
          </article>
        </body></html>
    "#;

    fn pub_spec() -> SelectorSpec {
        SelectorSpec::new().inner(
            "Pubs",
            "article",
            SelectorSpec::new()
                .leaf("ID", "::attr(id)")
                .leaf("NameAddress", "h1.entry-title ::text")
                .leaf("Tags", "ul.tags li")
                .leaf("URL", "div.particulars a ::attr(href)"),
        )
    }

    #[test]
    fn text_attr_and_default_suffixes() {
        let doc = Html::parse_document(PAGE);
        let root = doc.root_element();
        let lookup = CssLookup::new();

        let out = extract(&lookup, &root, &pub_spec());
        let record = out.as_record().unwrap();
        let FieldValue::Records(pubs) = record.get("Pubs").unwrap() else {
            panic!("expected nested pub records");
        };
        assert_eq!(pubs.len(), 2);

        let first = pubs[0].as_record().unwrap();
        // Bare ::attr reads the current node's own attribute
        assert_eq!(
            first.get("ID"),
            Some(&FieldValue::Scalars(vec!["pub-1".into()]))
        );
        assert_eq!(
            first.get("NameAddress"),
            Some(&FieldValue::Scalars(vec![
                "The Crown, 14 High Street, York".into()
            ]))
        );
        // No suffix defaults to ::text
        assert_eq!(
            first.get("Tags"),
            Some(&FieldValue::Scalars(vec!["Freehold".into(), "Garden".into()]))
        );
        assert_eq!(
            first.get("URL"),
            Some(&FieldValue::Scalars(vec!["/pubs/the-crown.pdf".into()]))
        );
    }

    #[test]
    fn attr_on_scoping_element_is_empty_not_error() {
        // `article ::attr(id)` inside an <article> selects descendant
        // articles, of which there are none — an empty list, not a failure.
        let doc = Html::parse_document(PAGE);
        let root = doc.root_element();
        let lookup = CssLookup::new();

        let articles = lookup.nodes(&root, "article").unwrap();
        let ids = lookup.values(&articles[0], "article ::attr(id)").unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn missing_attribute_shortens_match_list() {
        let doc = Html::parse_document(PAGE);
        let root = doc.root_element();
        let lookup = CssLookup::new();

        // h1 elements have no href
        let hrefs = lookup.values(&root, "h1 ::attr(href)").unwrap();
        assert!(hrefs.is_empty());
    }

    #[test]
    fn invalid_selector_is_a_path_error() {
        let doc = Html::parse_document(PAGE);
        let root = doc.root_element();
        let lookup = CssLookup::new();

        assert!(lookup.values(&root, "div[unclosed ::text").is_err());
        assert!(lookup.nodes(&root, "li ::text").is_err());
    }

    #[test]
    fn empty_attr_name_is_a_path_error() {
        let doc = Html::parse_document(PAGE);
        let root = doc.root_element();
        let lookup = CssLookup::new();

        assert!(lookup.values(&root, "a ::attr()").is_err());
    }
}
