//! Vendor connectors: one module per listings source.
//!
//! A connector owns everything vendor-specific — endpoint, payload or page
//! structure, column cleanup, geocoding query shape — behind the
//! [`VendorConnector`] trait, so the ETL driver and the pipeline stay
//! vendor-agnostic. Adding a source means adding a module here and nothing
//! else.
//!
//! The shipped connectors cover the source shapes in the wild:
//! [`wellington`] scrapes paginated HTML with a selector spec, [`admiral`]
//! scrapes a single all-listings HTML page, and [`stonegate`] hits a JSON
//! search API and flattens the payload.

pub mod admiral;
pub mod stonegate;
pub mod wellington;

use async_trait::async_trait;

use crate::error::EtlError;
use crate::table::{Row, Table, Value};

/// A listings source, as the ETL driver sees it.
#[async_trait]
pub trait VendorConnector: Send + Sync {
    /// Vendor name, stamped into the `Source` column of every row.
    fn name(&self) -> &'static str;

    /// Fetch the vendor's current listings as a raw table, in the
    /// vendor-defined column layout.
    async fn fetch(&self, client: &reqwest::Client) -> Result<Table, EtlError>;

    /// Normalise a raw table onto the common schema (`Name`,
    /// `StreetAddress`, `AnnualRent`, ...). Purely in-memory; must not
    /// touch the network.
    fn clean(&self, raw: Table) -> Table;

    /// The geocoding query for one cleaned row. `None` means the row
    /// lacks what this vendor geocodes by, and the lookup is skipped.
    fn search_string(&self, row: &Row) -> Option<String>;
}

/// Stamp provenance columns onto a freshly fetched table.
pub(crate) fn stamp_provenance(table: &mut Table, source: &str, scrape_date: &str) {
    let rows = table.len();
    table.add_column("Source", vec![Value::Str(source.to_string()); rows]);
    table.add_column("ScrapeDate", vec![Value::Str(scrape_date.to_string()); rows]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_is_stamped_on_every_row() {
        let mut table = Table::new();
        table.push_row(vec![("Name".into(), "The Crown".into())]);
        table.push_row(vec![("Name".into(), "The Swan".into())]);

        stamp_provenance(&mut table, "Stonegate", "2024-03-01");

        for row in 0..2 {
            assert_eq!(
                table.get(row, "Source").and_then(|v| v.as_str()),
                Some("Stonegate")
            );
            assert_eq!(
                table.get(row, "ScrapeDate").and_then(|v| v.as_str()),
                Some("2024-03-01")
            );
        }
    }
}
