//! Wellington Pub Company connector: paginated HTML listings.
//!
//! The site serves listings as numbered pages of `<article>` elements with
//! no total count anywhere, so fetching walks pages from 1 until a page
//! yields zero articles. Each page goes through a selector spec; the
//! per-article fields are joined into table cells and the pages are
//! stacked into one raw table.
//!
//! Cleaning splits the combined `"Name, Street Address"` heading into two
//! columns and drops the scratch fields the spec captures along the way.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info};

use crate::connectors::VendorConnector;
use crate::error::EtlError;
use crate::extract::css::CssLookup;
use crate::extract::{extract, records_to_table, ExtractedRecord, FieldValue, SelectorSpec};
use crate::table::{Row, Table, Value};

const BASE_URL: &str = "https://wellingtonpubcompany.co.uk/pubs";

/// Heading shape: everything before the first comma is the pub name, the
/// rest is the street address.
static NAME_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^,]+), (.+)$").expect("static regex"));

/// Per-page extraction spec. `ID` reads the article's own attribute; the
/// rest select within it.
fn page_spec() -> SelectorSpec {
    SelectorSpec::new().inner(
        "Pubs",
        "article",
        SelectorSpec::new()
            .leaf("ID", "::attr(id)")
            .leaf("NameAddress", "h1.entry-title ::text")
            .leaf("Tags", "ul.tags li ::text")
            .leaf("Description", "div.entry-content ul li ::text")
            .leaf("URL", "div.particulars a ::attr(href)")
            .leaf("NegotiatorMailURL", "div.negotiator a ::attr(href)"),
    )
}

/// Wellington Pub Company listings source.
pub struct Wellington {
    base_url: String,
    separator: String,
}

impl Default for Wellington {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            separator: ", ".to_string(),
        }
    }
}

impl Wellington {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect page requests (tests, mirrors).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Separator for multi-valued extracted fields (tags, description
    /// bullet points).
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    async fn fetch_page(
        &self,
        client: &reqwest::Client,
        page_number: u32,
    ) -> Result<Table, EtlError> {
        let url = format!("{}/page/{}/", self.base_url.trim_end_matches('/'), page_number);
        debug!("Fetching Wellington page {page_number} at {url}");

        let fetch_err = |reason: String| EtlError::FetchFailed {
            vendor: "Wellington Pub Company".to_string(),
            reason,
        };

        let response = client.get(&url).send().await.map_err(|e| fetch_err(e.to_string()))?;

        // The paginator 404s one page past the end; that is the stop
        // signal, not a failure.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Table::new());
        }
        if !response.status().is_success() {
            return Err(fetch_err(format!("{url} returned {}", response.status())));
        }

        let body = response.text().await.map_err(|e| fetch_err(e.to_string()))?;
        Ok(self.parse_page(&body))
    }

    /// Extract one page of listings into a table, joining multi-valued
    /// fields on this connector's separator. A page with no articles
    /// produces an empty table.
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

#[async_trait]
impl VendorConnector for Wellington {
    fn name(&self) -> &'static str {
        "WellingtonPubCompany"
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<Table, EtlError> {
        info!("Getting data from Wellington Pub Company");

        let mut pages = Vec::new();
        let mut page_number = 1u32;
        loop {
            let page = self.fetch_page(client, page_number).await?;
            if page.is_empty() {
                break;
            }
            info!("Wellington page {page_number}: {} listings", page.len());
            pages.push(page);
            page_number += 1;
        }

        let table = Table::concat(pages);
        info!(
            "Wellington fetch complete: {} listings across {} pages",
            table.len(),
            page_number - 1
        );
        Ok(table)
    }

    fn clean(&self, mut table: Table) -> Table {
        table.drop_columns(&["ID", "Tags", "Description", "NegotiatorMailURL"]);

        let mut names = Vec::with_capacity(table.len());
        let mut streets = Vec::with_capacity(table.len());
        for row in table.rows() {
            let captures = row
                .get("NameAddress")
                .and_then(|v| v.as_str())
                .and_then(|s| NAME_ADDRESS.captures(s.trim()));
            match captures {
                Some(c) => {
                    names.push(Value::Str(c[1].to_string()));
                    streets.push(Value::Str(c[2].to_string()));
                }
                // Headings without a comma split into nothing, like the
                // unmatched-extract behaviour this replaces
                None => {
                    names.push(Value::Null);
                    streets.push(Value::Null);
                }
            }
        }
        table.add_column("Name", names);
        table.add_column("StreetAddress", streets);
        table.drop_columns(&["NameAddress"]);
        table
    }

    fn search_string(&self, row: &Row) -> Option<String> {
        let street = row.get("StreetAddress")?.as_str()?;
        Some(format!("{street}, UK"))
    }
}
