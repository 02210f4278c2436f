//! Stonegate connector: one JSON search request.
//!
//! The vendor exposes a pub-search service that happily returns the whole
//! estate in a single response when asked for ten thousand rows around a
//! nowhere point. The query text bounds the coordinates to the UK so the
//! payload only contains real listings.
//!
//! The response's `Results` array is flattened into dot-keyed columns;
//! cleaning then selects the handful of columns the common schema cares
//! about and renames them. Listings arrive with their own coordinates, so
//! the geocoding query is the coordinate pair — enrichment resolves the
//! address fields the vendor does not provide.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::connectors::VendorConnector;
use crate::error::EtlError;
use crate::table::{Row, Table};

const ENDPOINT: &str = "https://www.stonegatepubpartners.co.uk/run-a-pub/_vti_bin/Brightstarr.EI.Intranet/Pubs/Pubs.svc/GetResultsFromSearch";

/// The one search request we ever send: everything, UK-bounded.
fn search_payload() -> serde_json::Value {
    json!({
        "queryText": "contenttype:\"Pub Marketing Information\" \
            AND EIPubLatitudeOWSNMBRFLOAT>40 \
            AND EIPubLatitudeOWSNMBRFLOAT<62 \
            AND EIPubLongitudeOWSNMBRFLOAT>-10 \
            AND EIPubLongitudeOWSNMBRFLOAT<10 ",
        "latitude": -100,
        "longitude": -100,
        "maxDistance": 10000,
        "sortBy": "distance",
        "skip": 0,
        "take": 10000,
        "maxRows": 10000,
    })
}

/// Stonegate listings source.
pub struct Stonegate {
    endpoint: String,
}

impl Default for Stonegate {
    fn default() -> Self {
        Self {
            endpoint: ENDPOINT.to_string(),
        }
    }
}

impl Stonegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect the search request (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Pull the `Results` array out of a search response and flatten it.
fn results_table(body: &serde_json::Value) -> Result<Table, EtlError> {
    let results = body
        .get("Results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| EtlError::VendorPayload {
            vendor: "Stonegate".to_string(),
            detail: "response has no 'Results' array".to_string(),
        })?;
    Ok(Table::from_json_records(results))
}

#[async_trait]
impl VendorConnector for Stonegate {
    fn name(&self) -> &'static str {
        "Stonegate"
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<Table, EtlError> {
        info!("Getting data from Stonegate at {}", self.endpoint);

        let fetch_err = |reason: String| EtlError::FetchFailed {
            vendor: "Stonegate".to_string(),
            reason,
        };

        let response = client
            .post(&self.endpoint)
            .json(&search_payload())
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("search returned {}", response.status())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| fetch_err(format!("decoding response body: {e}")))?;

        let table = results_table(&body)?;
        info!("Stonegate fetch complete: {} listings", table.len());
        Ok(table)
    }

    fn clean(&self, mut table: Table) -> Table {
        table.select_columns(&[
            "GuideRent",
            "PubName",
            "PubLinkUrl",
            "Latitude",
            "Longitude",
            "PubAddress",
            "Postcode",
            "ScrapeDate",
            "Source",
        ]);
        table.rename_column("GuideRent", "AnnualRent");
        table.rename_column("PubName", "Name");
        table.rename_column("PubLinkUrl", "URL");
        table.rename_column("Latitude", "Lat");
        table.rename_column("Longitude", "Long");
        table.rename_column("PubAddress", "StreetAddress");
        table.rename_column("Postcode", "PostalCode");
        table
    }

    fn search_string(&self, row: &Row) -> Option<String> {
        let lat = row.get("Lat")?.as_float()?;
        let long = row.get("Long")?.as_float()?;
        Some(format!("{lat}, {long}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn sample_body() -> serde_json::Value {
        json!({
            "TotalRows": 2,
            "Results": [
                {
                    "GuideRent": "28000",
                    "PubName": "The Crown",
                    "PubLinkUrl": "https://example.co.uk/the-crown",
                    "Latitude": 53.959,
                    "Longitude": -1.081,
                    "PubAddress": "14 High Street, York",
                    "Postcode": "YO1 8QN",
                    "TradingArea": "North"
                },
                {
                    "GuideRent": "35000",
                    "PubName": "The Swan",
                    "PubLinkUrl": "https://example.co.uk/the-swan",
                    "Latitude": 53.8008,
                    "Longitude": -1.5491,
                    "PubAddress": "3 Mill Lane, Leeds",
                    "Postcode": "LS1 4AB",
                    "TradingArea": "North"
                }
            ]
        })
    }

    #[test]
    fn results_array_flattens_to_rows() {
        let table = results_table(&sample_body()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(0, "PubName").and_then(|v| v.as_str()),
            Some("The Crown")
        );
        assert_eq!(table.get(1, "Latitude"), Some(&Value::Float(53.8008)));
    }

    #[test]
    fn missing_results_is_a_payload_error() {
        let err = results_table(&json!({ "TotalRows": 0 })).unwrap_err();
        assert!(matches!(err, EtlError::VendorPayload { .. }));
        assert!(err.to_string().contains("Results"));
    }

    #[test]
    fn clean_selects_and_renames_onto_common_schema() {
        let mut raw = results_table(&sample_body()).unwrap();
        crate::connectors::stamp_provenance(&mut raw, "Stonegate", "2024-03-01");

        let clean = Stonegate::new().clean(raw);
        assert_eq!(
            clean.columns(),
            &[
                "AnnualRent",
                "Name",
                "URL",
                "Lat",
                "Long",
                "StreetAddress",
                "PostalCode",
                "ScrapeDate",
                "Source"
            ]
        );
        assert_eq!(
            clean.get(0, "AnnualRent").and_then(|v| v.as_str()),
            Some("28000")
        );
        // Vendor-only columns are gone
        assert!(!clean.columns().iter().any(|c| c == "TradingArea"));
    }

    #[test]
    fn search_string_is_the_coordinate_pair() {
        let raw = results_table(&sample_body()).unwrap();
        let connector = Stonegate::new();
        let clean = connector.clean(raw);

        let query = connector.search_string(clean.row(0).unwrap());
        assert_eq!(query.as_deref(), Some("53.959, -1.081"));
    }

    #[test]
    fn rows_without_coordinates_skip_the_lookup() {
        let mut table = Table::new();
        table.push_row(vec![("Lat".into(), Value::Null), ("Long".into(), Value::Null)]);
        assert!(Stonegate::new().search_string(table.row(0).unwrap()).is_none());
    }
}
