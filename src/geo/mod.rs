//! Geographic enrichment: free-text location queries → structured address
//! attributes, merged into a table.
//!
//! The geocoding call itself sits behind the [`Geocoder`] trait so tests
//! (and cached or rate-limited wrappers) can stand in for the live
//! service. [`resolve`] fans a query batch out with bounded concurrency
//! and reassembles results **by input index**, so the output order always
//! matches the input order no matter which calls finish first.
//!
//! A query that errors or returns zero candidates degrades to an absent
//! entry and bumps the batch's failure count; it never cancels or fails
//! sibling queries. There is no batch-level timeout — only the per-request
//! timeout the underlying client enforces.

pub mod google;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error::GeoError;
use crate::table::{Table, Value};

/// One ranked candidate from the geocoding service.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
    pub components: Vec<AddressComponent>,
}

/// A typed address component; `types` is ordered most-specific-first, as
/// the service returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressComponent {
    pub types: Vec<String>,
    pub short_name: String,
}

/// Resolves one free-text query to ranked candidates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(vec![])` means the service answered but found nothing; `Err` is
    /// a failed call. Both degrade to an absent batch entry.
    async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeoError>;
}

impl std::fmt::Debug for dyn Geocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Geocoder")
    }
}

/// The structured address extracted from the best candidate.
///
/// Every component except the coordinates and the formatted address may be
/// missing from a candidate; missing maps to `None`, never to an error.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoResult {
    pub lat: f64,
    pub lng: f64,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub formatted_address: String,
}

impl GeoResult {
    /// Map the first-ranked candidate's components onto the common schema.
    ///
    /// Components are keyed by their most specific type. `City` prefers
    /// `postal_town` (what UK payloads carry) and falls back to the generic
    /// `locality`; `Region`/`State` are the second- and first-level
    /// administrative areas.
    pub fn from_candidate(candidate: &Candidate) -> Self {
        let component = |key: &str| -> Option<String> {
            candidate
                .components
                .iter()
                .find(|c| c.types.first().map(|t| t == key).unwrap_or(false))
                .map(|c| c.short_name.clone())
        };

        let street_address = {
            let parts: Vec<String> = [component("street_number"), component("route")]
                .into_iter()
                .flatten()
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        };

        Self {
            lat: candidate.lat,
            lng: candidate.lng,
            street_address,
            city: component("postal_town").or_else(|| component("locality")),
            region: component("administrative_area_level_2"),
            state: component("administrative_area_level_1"),
            country: component("country"),
            postal_code: component("postal_code"),
            formatted_address: candidate.formatted_address.clone(),
        }
    }

    /// Enrichment columns in table form, in the order they appear in
    /// artifacts.
    pub fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("Lat", Value::Float(self.lat)),
            ("Long", Value::Float(self.lng)),
            ("StreetAddress", self.street_address.clone().into()),
            ("City", self.city.clone().into()),
            ("Region", self.region.clone().into()),
            ("State", self.state.clone().into()),
            ("Country", self.country.clone().into()),
            ("PostalCode", self.postal_code.clone().into()),
            (
                "FormattedAddress",
                Value::Str(self.formatted_address.clone()),
            ),
        ]
    }
}

/// Results for one query batch, in input order.
#[derive(Debug, Default)]
pub struct GeoBatch {
    entries: Vec<(String, Option<GeoResult>)>,
    /// Queries that errored or rendered no candidates.
    pub failures: usize,
}

impl GeoBatch {
    pub fn get(&self, query: &str) -> Option<&GeoResult> {
        self.entries
            .iter()
            .find(|(q, _)| q == query)
            .and_then(|(_, r)| r.as_ref())
    }

    pub fn entries(&self) -> impl Iterator<Item = &(String, Option<GeoResult>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve a batch of queries with at most `concurrency` calls in flight.
///
/// Callers should deduplicate `queries` first: the batch issues exactly one
/// upstream call per entry, duplicates included. The worker pool lives only
/// for this call; nothing is shared across invocations.
pub async fn resolve(
    geocoder: Arc<dyn Geocoder>,
    queries: &[String],
    concurrency: usize,
) -> GeoBatch {
    info!(
        "Geocoding {} queries with {} in flight",
        queries.len(),
        concurrency
    );

    let results: Vec<(usize, Option<GeoResult>)> =
        stream::iter(queries.iter().cloned().enumerate().map(|(index, query)| {
            let geocoder = Arc::clone(&geocoder);
            async move {
                match geocoder.geocode(&query).await {
                    Ok(candidates) => match candidates.first() {
                        // Always the first-ranked candidate; no disambiguation
                        Some(best) => (index, Some(GeoResult::from_candidate(best))),
                        None => {
                            warn!("{}", GeoError::NoCandidates { query: query.clone() });
                            (index, None)
                        }
                    },
                    Err(e) => {
                        warn!("{e}");
                        (index, None)
                    }
                }
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    // Reassemble by index: completion order is whatever the network gave us
    let mut entries: Vec<(String, Option<GeoResult>)> =
        queries.iter().map(|q| (q.clone(), None)).collect();
    let mut failures = 0;
    for (index, result) in results {
        if result.is_none() {
            failures += 1;
        }
        entries[index].1 = result;
    }

    if failures > 0 {
        warn!("{failures}/{} geocoding queries produced no result", queries.len());
    }

    GeoBatch { entries, failures }
}

/// Merge a resolved batch into a table by a key column, as a fill-missing
/// overlay.
///
/// For each row whose `key_column` value matches a resolved query, the
/// enrichment columns are added — but a pre-existing **non-null** table
/// value always wins over the enrichment value. Vendor-supplied data is
/// first-writer; geocoding only fills gaps.
pub fn merge_geo(table: &mut Table, key_column: &str, batch: &GeoBatch) {
    let by_query: HashMap<&str, &GeoResult> = batch
        .entries
        .iter()
        .filter_map(|(q, r)| r.as_ref().map(|r| (q.as_str(), r)))
        .collect();

    for row in 0..table.len() {
        let Some(key) = table
            .get(row, key_column)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
        else {
            continue;
        };
        let Some(geo) = by_query.get(key.as_str()) else {
            continue;
        };

        for (column, value) in geo.columns() {
            let existing_is_null = table
                .get(row, column)
                .map(|v| v.is_null())
                .unwrap_or(true);
            if existing_is_null {
                table.set(row, column, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned geocoder: a map of query → candidates; unknown queries error.
    struct CannedGeocoder {
        answers: HashMap<String, Vec<Candidate>>,
        calls: AtomicUsize,
    }

    impl CannedGeocoder {
        fn new(answers: Vec<(&str, Vec<Candidate>)>) -> Arc<Self> {
            Arc::new(Self {
                answers: answers
                    .into_iter()
                    .map(|(q, c)| (q.to_string(), c))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Geocoder for CannedGeocoder {
        async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .get(query)
                .cloned()
                .ok_or_else(|| GeoError::RequestFailed {
                    query: query.to_string(),
                    detail: "canned failure".into(),
                })
        }
    }

    fn leeds_candidate() -> Candidate {
        Candidate {
            lat: 53.8008,
            lng: -1.5491,
            formatted_address: "3 Mill Lane, Leeds LS1 4AB, UK".into(),
            components: vec![
                AddressComponent {
                    types: vec!["street_number".into()],
                    short_name: "3".into(),
                },
                AddressComponent {
                    types: vec!["route".into()],
                    short_name: "Mill Lane".into(),
                },
                AddressComponent {
                    types: vec!["postal_town".into()],
                    short_name: "Leeds".into(),
                },
                AddressComponent {
                    types: vec!["administrative_area_level_1".into(), "political".into()],
                    short_name: "England".into(),
                },
                AddressComponent {
                    types: vec!["country".into(), "political".into()],
                    short_name: "GB".into(),
                },
                AddressComponent {
                    types: vec!["postal_code".into()],
                    short_name: "LS1 4AB".into(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn one_good_one_bad_query_keeps_order() {
        let geocoder = CannedGeocoder::new(vec![
            ("51.5,-0.12", vec![leeds_candidate()]),
            ("bad-query", vec![]),
        ]);
        let queries = vec!["51.5,-0.12".to_string(), "bad-query".to_string()];

        let batch = resolve(geocoder, &queries, 2).await;

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.failures, 1);
        let entries: Vec<_> = batch.entries().collect();
        assert_eq!(entries[0].0, "51.5,-0.12");
        assert!(entries[0].1.is_some());
        assert_eq!(entries[1].0, "bad-query");
        assert!(entries[1].1.is_none());
    }

    #[tokio::test]
    async fn erroring_query_does_not_fail_siblings() {
        let geocoder = CannedGeocoder::new(vec![("good", vec![leeds_candidate()])]);
        let queries = vec!["unknown".to_string(), "good".to_string()];

        let batch = resolve(geocoder, &queries, 8).await;
        assert_eq!(batch.failures, 1);
        assert!(batch.get("good").is_some());
        assert!(batch.get("unknown").is_none());
    }

    #[tokio::test]
    async fn every_query_issues_exactly_one_call() {
        let geocoder = CannedGeocoder::new(vec![("q", vec![leeds_candidate()])]);
        let queries = vec!["q".to_string(), "q".to_string(), "q".to_string()];
        let calls = {
            let batch = resolve(Arc::clone(&geocoder) as Arc<dyn Geocoder>, &queries, 2).await;
            assert_eq!(batch.len(), 3);
            geocoder.calls.load(Ordering::SeqCst)
        };
        // Duplicates are the caller's problem; we issue one call each
        assert_eq!(calls, 3);
    }

    #[test]
    fn candidate_mapping_extracts_components() {
        let geo = GeoResult::from_candidate(&leeds_candidate());
        assert_eq!(geo.street_address.as_deref(), Some("3, Mill Lane"));
        assert_eq!(geo.city.as_deref(), Some("Leeds"));
        assert_eq!(geo.state.as_deref(), Some("England"));
        assert_eq!(geo.country.as_deref(), Some("GB"));
        assert_eq!(geo.postal_code.as_deref(), Some("LS1 4AB"));
        // No administrative_area_level_2 in the candidate
        assert_eq!(geo.region, None);
    }

    #[test]
    fn locality_is_city_fallback() {
        let mut candidate = leeds_candidate();
        candidate.components.retain(|c| c.types[0] != "postal_town");
        candidate.components.push(AddressComponent {
            types: vec!["locality".into()],
            short_name: "Leeds".into(),
        });
        let geo = GeoResult::from_candidate(&candidate);
        assert_eq!(geo.city.as_deref(), Some("Leeds"));
    }

    #[test]
    fn merge_fills_missing_but_never_overwrites() {
        let mut table = Table::new();
        table.push_row(vec![
            ("SearchString".into(), "3 Mill Lane, UK".into()),
            ("AnnualRent".into(), "32000".into()),
            ("City".into(), Value::Null),
        ]);

        let batch = GeoBatch {
            entries: vec![(
                "3 Mill Lane, UK".into(),
                Some(GeoResult::from_candidate(&leeds_candidate())),
            )],
            failures: 0,
        };

        merge_geo(&mut table, "SearchString", &batch);

        // Vendor value wins (GeoResult has no AnnualRent equivalent anyway)
        assert_eq!(
            table.get(0, "AnnualRent").and_then(|v| v.as_str()),
            Some("32000")
        );
        // Null City is filled from enrichment
        assert_eq!(
            table.get(0, "City").and_then(|v| v.as_str()),
            Some("Leeds")
        );
        assert_eq!(table.get(0, "Lat"), Some(&Value::Float(53.8008)));
    }

    #[test]
    fn merge_prefers_existing_non_null_over_enrichment() {
        let mut table = Table::new();
        table.push_row(vec![
            ("SearchString".into(), "q".into()),
            ("PostalCode".into(), "LS99 9ZZ".into()),
        ]);

        let batch = GeoBatch {
            entries: vec![("q".into(), Some(GeoResult::from_candidate(&leeds_candidate())))],
            failures: 0,
        };
        merge_geo(&mut table, "SearchString", &batch);

        // Vendor-supplied postcode beats the geocoder's
        assert_eq!(
            table.get(0, "PostalCode").and_then(|v| v.as_str()),
            Some("LS99 9ZZ")
        );
    }

    #[test]
    fn rows_without_key_are_untouched() {
        let mut table = Table::new();
        table.push_row(vec![("SearchString".into(), Value::Null)]);

        let batch = GeoBatch {
            entries: vec![("q".into(), Some(GeoResult::from_candidate(&leeds_candidate())))],
            failures: 0,
        };
        merge_geo(&mut table, "SearchString", &batch);
        assert_eq!(table.get(0, "City"), Some(&Value::Null));
    }
}
