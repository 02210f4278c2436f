//! Admiral Taverns connector: one HTML page with every listing on it.
//!
//! The find-a-pub search accepts a "results per page" of -1, so a single
//! request with an empty postcode search returns the whole estate. The
//! page spec here is kept as untyped JSON and parsed with
//! [`SelectorSpec::from_json`], the shape vendor specs are usually
//! maintained in.
//!
//! Listings quote an ingoing cost as free text ("Approximate Ingoings
//! £15,000"); cleaning strips the label and the thousands punctuation and
//! parses what remains into a numeric `AnnualRent`.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde_json::json;
use tracing::{info, warn};

use crate::connectors::VendorConnector;
use crate::error::EtlError;
use crate::extract::css::CssLookup;
use crate::extract::{extract, records_to_table, ExtractedRecord, FieldValue, SelectorSpec};
use crate::table::{Row, Table, Value};

const URL: &str = "https://www.admiraltaverns.co.uk/find-a-pub/?pcSearch&z=2&ppp=-1";

/// Label (and optional pound sign) in front of the ingoing cost.
static INGOINGS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Approximate Ingoings\s*£?").expect("static regex"));

/// Thousands separators and decimal points in the remaining figure.
static PRICE_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.,]").expect("static regex"));

fn page_spec() -> SelectorSpec {
    SelectorSpec::from_json(&json!({
        "Pubs": [
            "div.newsArticle.table",
            {
                "Name": "div > a ::text",
                "URL": "div > a ::attr(href)",
                "StreetAddress": "p.location ::text",
                "ApproximatePrice": "p.price ::text",
                "Description": "div.excerpt ::text",
            }
        ]
    }))
}

/// Admiral Taverns listings source.
pub struct Admiral {
    url: String,
    separator: String,
}

impl Default for Admiral {
    fn default() -> Self {
        Self {
            url: URL.to_string(),
            separator: ", ".to_string(),
        }
    }
}

impl Admiral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect the page request (tests, mirrors).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Separator for multi-valued extracted fields.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Extract the listings page into a table, one row per listing card.
    fn parse_page(&self, html: &str) -> Table {
        let doc = Html::parse_document(html);
        let root = doc.root_element();
        let lookup = CssLookup::new();

        let extracted = extract(&lookup, &root, &page_spec());
        let Some(page) = extracted.as_record() else {
            return Table::new();
        };
        let Some(FieldValue::Records(pubs)) = page.get("Pubs") else {
            return Table::new();
        };

        let records: Vec<&ExtractedRecord<_>> =
            pubs.iter().filter_map(|p| p.as_record()).collect();
        records_to_table(&records, &self.separator)
    }
}

/// "Approximate Ingoings £15,000" → `15000.0`. Anything that does not
/// parse after stripping degrades to `Null` so one odd listing cannot
/// abort the clean stage.
fn parse_ingoings(price: &str) -> Value {
    let stripped = INGOINGS_LABEL.replace(price, "");
    let digits = PRICE_PUNCTUATION.replace_all(stripped.trim(), "");
    match digits.parse::<f64>() {
        Ok(rent) => Value::Float(rent),
        Err(_) => {
            warn!("Unparseable ingoings figure: {price:?}");
            Value::Null
        }
    }
}

#[async_trait]
impl VendorConnector for Admiral {
    fn name(&self) -> &'static str {
        "AdmiralTaverns"
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<Table, EtlError> {
        info!("Getting data from Admiral Taverns at {}", self.url);

        let fetch_err = |reason: String| EtlError::FetchFailed {
            vendor: "Admiral Taverns".to_string(),
            reason,
        };

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("listings page returned {}", response.status())));
        }

        let body = response.text().await.map_err(|e| fetch_err(e.to_string()))?;
        let table = self.parse_page(&body);
        info!("Admiral Taverns fetch complete: {} listings", table.len());
        Ok(table)
    }

    fn clean(&self, mut table: Table) -> Table {
        let rents: Vec<Value> = table
            .rows()
            .map(|row| {
                row.get("ApproximatePrice")
                    .and_then(|v| v.as_str())
                    .map_or(Value::Null, parse_ingoings)
            })
            .collect();
        table.add_column("AnnualRent", rents);
        table.drop_columns(&["ApproximatePrice", "Description"]);
        table
    }

    fn search_string(&self, row: &Row) -> Option<String> {
        let street = row.get("StreetAddress")?.as_str()?;
        Some(format!("{street}, UK"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="newsArticle table">
            <div><a href="/pubs/the-crown/">The Crown</a></div>
            <p class="location">14 High Street, York</p>
            <p class="price">Approximate Ingoings £15,000</p>
            <div class="excerpt">A traditional two-bar community pub.</div>
          </div>
          <div class="newsArticle table">
            <div><a href="/pubs/the-swan/">The Swan</a></div>
            <p class="location">3 Mill Lane, Leeds</p>
            <p class="price">Approximate Ingoings POA</p>
            <div class="excerpt">Riverside site with kitchen.</div>
          </div>
        </body></html>
    "#;

    #[test]
    fn page_parses_to_one_row_per_listing_card() {
        let table = Admiral::new().parse_page(PAGE);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(0, "Name").and_then(|v| v.as_str()),
            Some("The Crown")
        );
        assert_eq!(
            table.get(0, "URL").and_then(|v| v.as_str()),
            Some("/pubs/the-crown/")
        );
        assert_eq!(
            table.get(1, "StreetAddress").and_then(|v| v.as_str()),
            Some("3 Mill Lane, Leeds")
        );
    }

    #[test]
    fn clean_parses_ingoings_and_drops_scratch_columns() {
        let connector = Admiral::new();
        let clean = connector.clean(connector.parse_page(PAGE));

        assert_eq!(clean.get(0, "AnnualRent"), Some(&Value::Float(15000.0)));
        // "POA" carries no figure
        assert!(clean.get(1, "AnnualRent").unwrap().is_null());
        for dropped in ["ApproximatePrice", "Description"] {
            assert!(
                !clean.columns().iter().any(|c| c == dropped),
                "column {dropped} should be dropped"
            );
        }
    }

    #[test]
    fn ingoings_without_pound_sign_still_parse() {
        assert_eq!(
            parse_ingoings("Approximate Ingoings 9,500"),
            Value::Float(9500.0)
        );
    }

    #[test]
    fn search_string_is_street_address_in_the_uk() {
        let connector = Admiral::new();
        let clean = connector.clean(connector.parse_page(PAGE));

        let query = connector.search_string(clean.row(0).unwrap());
        assert_eq!(query.as_deref(), Some("14 High Street, York, UK"));
    }

    #[test]
    fn missing_street_address_skips_the_lookup() {
        let mut table = Table::new();
        table.push_row(vec![("StreetAddress".into(), Value::Null)]);
        assert!(Admiral::new().search_string(table.row(0).unwrap()).is_none());
    }
}
