//! Top-level ETL driver: one vendor, one dated run, three stages.
//!
//! [`run_vendor_etl`] wires a [`VendorConnector`] into the staged pipeline:
//!
//! ```text
//!   raw  ── fetch from the vendor, stamp provenance
//!   clean ── normalise onto the common schema
//!   geo  ── build search strings, geocode, merge enrichment
//! ```
//!
//! The run key is the run's calendar date, so re-running the binary on the
//! same day picks up exactly where the last attempt stopped. The geocoder
//! is resolved inside the geo stage, not up front — a run whose geo
//! artifact already exists never needs an API key.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::EtlConfig;
use crate::connectors::{stamp_provenance, VendorConnector};
use crate::error::EtlError;
use crate::geo::google::GoogleGeocoder;
use crate::geo::{merge_geo, resolve, Geocoder};
use crate::pipeline::store::{ArtifactKey, CheckpointStore, DirStore};
use crate::pipeline::StagedPipeline;
use crate::table::{Table, Value};

const STAGE_RAW: &str = "raw";
const STAGE_CLEAN: &str = "clean";
const STAGE_GEO: &str = "geo";

/// Counters for one completed run.
#[derive(Debug, Clone, Default)]
pub struct EtlStats {
    pub raw_rows: usize,
    pub clean_rows: usize,
    /// Distinct geocoding queries issued (zero when the geo stage skipped).
    pub geo_queries: usize,
    pub geo_failures: usize,
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    pub total_duration_ms: u64,
}

/// Result of one ETL run: the enriched table plus run bookkeeping.
#[derive(Debug)]
pub struct EtlOutput {
    pub table: Table,
    pub run_key: String,
    pub stats: EtlStats,
}

/// Run the full ETL for one vendor into `working_dir`.
///
/// Artifacts land as `<run-date>-raw.csv`, `-clean.csv` and `-geo.csv`;
/// any that already exist short-circuit their stage. Fatal errors leave
/// completed artifacts in place, so the run stays resumable.
pub async fn run_vendor_etl(
    connector: Arc<dyn VendorConnector>,
    working_dir: impl Into<PathBuf>,
    config: &EtlConfig,
) -> Result<EtlOutput, EtlError> {
    let started = Instant::now();

    let run_date = config
        .run_date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let run_key = run_date.to_string();
    info!("ETL run {} for vendor {}", run_key, connector.name());

    let store = DirStore::open(working_dir)?;
    let stats_store = store.clone();

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| EtlError::Internal(format!("building HTTP client: {e}")))?;

    let geo_queries = Arc::new(AtomicUsize::new(0));
    let geo_failures = Arc::new(AtomicUsize::new(0));

    let raw_connector = Arc::clone(&connector);
    let raw_client = client.clone();
    let raw_run_key = run_key.clone();

    let clean_connector = Arc::clone(&connector);

    let geo_connector = Arc::clone(&connector);
    let geo_client = client;
    let configured_geocoder = config.geocoder.clone();
    let api_key = config.api_key.clone();
    let concurrency = config.concurrency;
    let stage_queries = Arc::clone(&geo_queries);
    let stage_failures = Arc::clone(&geo_failures);

    let mut pipeline = StagedPipeline::new(store, run_key.clone())
        .stage(STAGE_RAW, move |_| {
            let connector = Arc::clone(&raw_connector);
            let client = raw_client.clone();
            let scrape_date = raw_run_key.clone();
            async move {
                let mut table = connector.fetch(&client).await?;
                stamp_provenance(&mut table, connector.name(), &scrape_date);
                Ok(table)
            }
        })
        .stage(STAGE_CLEAN, move |input| {
            let connector = Arc::clone(&clean_connector);
            async move {
                let input = input
                    .ok_or_else(|| EtlError::Internal("clean stage ran without raw output".into()))?;
                Ok(connector.clean(input))
            }
        })
        .stage(STAGE_GEO, move |input| {
            let connector = Arc::clone(&geo_connector);
            let client = geo_client.clone();
            let configured = configured_geocoder.clone();
            let api_key = api_key.clone();
            let queries_counter = Arc::clone(&stage_queries);
            let failures_counter = Arc::clone(&stage_failures);
            async move {
                let mut table = input
                    .ok_or_else(|| EtlError::Internal("geo stage ran without clean output".into()))?;

                let search_strings: Vec<Value> = table
                    .rows()
                    .map(|row| match connector.search_string(row) {
                        Some(query) => Value::Str(query),
                        None => Value::Null,
                    })
                    .collect();

                // Deduplicate before resolving; the merge fans results back
                // out to every matching row
                let mut seen = HashSet::new();
                let mut queries = Vec::new();
                for value in &search_strings {
                    if let Some(query) = value.as_str() {
                        if seen.insert(query.to_string()) {
                            queries.push(query.to_string());
                        }
                    }
                }
                table.add_column("SearchString", search_strings);

                let geocoder = resolve_geocoder(configured, api_key, &client)?;
                let batch = resolve(geocoder, &queries, concurrency).await;
                queries_counter.store(queries.len(), Ordering::SeqCst);
                failures_counter.store(batch.failures, Ordering::SeqCst);

                merge_geo(&mut table, "SearchString", &batch);
                Ok(table)
            }
        });

    let run = pipeline.run().await?;

    let raw_rows = stats_store
        .load(&ArtifactKey::new(&run_key, STAGE_RAW))?
        .len();
    let clean_rows = stats_store
        .load(&ArtifactKey::new(&run_key, STAGE_CLEAN))?
        .len();

    let stats = EtlStats {
        raw_rows,
        clean_rows,
        geo_queries: geo_queries.load(Ordering::SeqCst),
        geo_failures: geo_failures.load(Ordering::SeqCst),
        executed: run.executed,
        skipped: run.skipped,
        total_duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "ETL run {} finished: {} rows, {} executed / {} skipped stages, {} ms",
        run_key,
        run.table.len(),
        stats.executed.len(),
        stats.skipped.len(),
        stats.total_duration_ms
    );

    Ok(EtlOutput {
        table: run.table,
        run_key,
        stats,
    })
}

/// Pick the geocoder for this run: an explicitly configured instance, then
/// a configured API key, then the `GOOGLEMAPS_KEY` environment variable.
fn resolve_geocoder(
    configured: Option<Arc<dyn Geocoder>>,
    api_key: Option<String>,
    client: &reqwest::Client,
) -> Result<Arc<dyn Geocoder>, EtlError> {
    if let Some(geocoder) = configured {
        return Ok(geocoder);
    }
    match api_key
        .or_else(|| std::env::var("GOOGLEMAPS_KEY").ok())
        .filter(|key| !key.is_empty())
    {
        Some(key) => Ok(Arc::new(GoogleGeocoder::new(client.clone(), key))),
        None => Err(EtlError::GeocoderNotConfigured {
            hint: "Provide a geocoder or API key in the configuration, or set \
                   the GOOGLEMAPS_KEY environment variable."
                .to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::error::GeoError;
    use crate::geo::Candidate;

    struct NullGeocoder;

    #[async_trait]
    impl Geocoder for NullGeocoder {
        async fn geocode(&self, _query: &str) -> Result<Vec<Candidate>, GeoError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn configured_geocoder_wins_over_api_key() {
        let client = reqwest::Client::new();
        let configured: Arc<dyn Geocoder> = Arc::new(NullGeocoder);
        let resolved = resolve_geocoder(Some(configured), Some("key".into()), &client);
        assert!(resolved.is_ok());
    }

    #[test]
    fn api_key_builds_a_google_geocoder() {
        let client = reqwest::Client::new();
        assert!(resolve_geocoder(None, Some("AIza-test".into()), &client).is_ok());
    }

    #[test]
    fn blank_api_key_is_an_actionable_error() {
        // An empty key never falls through to the environment variable,
        // so this holds whatever the test process's env contains
        let client = reqwest::Client::new();
        let err = resolve_geocoder(None, Some(String::new()), &client).unwrap_err();
        assert!(matches!(err, EtlError::GeocoderNotConfigured { .. }));
        assert!(err.to_string().contains("GOOGLEMAPS_KEY"));
    }
}
