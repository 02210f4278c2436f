//! # uk-pubs-etl
//!
//! Scrape, clean and geo-enrich UK pub listings from multiple vendors.
//!
//! ## Why this crate?
//!
//! Pub companies publish their available tenancies in whatever shape suits
//! their website — paginated HTML here, a JSON search service there — and
//! none of them include usable location data. This crate turns each vendor
//! into a small connector (a selector spec or a payload mapping plus a
//! cleaning function), runs every vendor through the same dated,
//! checkpointed pipeline, and fills in the missing address and coordinate
//! columns via geocoding.
//!
//! ## Pipeline Overview
//!
//! ```text
//! vendor site / API
//!  │
//!  ├─ 1. raw    fetch listings, stamp Source + ScrapeDate      → <date>-raw.csv
//!  ├─ 2. clean  normalise onto the common column schema        → <date>-clean.csv
//!  └─ 3. geo    geocode search strings (bounded concurrency),
//!               merge enrichment without overwriting vendor data → <date>-geo.csv
//! ```
//!
//! Each stage checkpoints to a dated CSV; a stage whose artifact already
//! exists is skipped entirely, so an interrupted run resumes for free and
//! paid geocoding calls are never repeated for the same day.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use uk_pubs_etl::{run_vendor_etl, EtlConfig};
//! use uk_pubs_etl::connectors::wellington::Wellington;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key auto-detected from GOOGLEMAPS_KEY if not set here
//!     let config = EtlConfig::builder().concurrency(20).build()?;
//!     let output = run_vendor_etl(Arc::new(Wellington::new()), "data", &config).await?;
//!     println!(
//!         "{} listings, {} geocoding failures",
//!         output.table.len(),
//!         output.stats.geo_failures
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pubs-etl` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! uk-pubs-etl = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod connectors;
pub mod error;
pub mod etl;
pub mod extract;
pub mod geo;
pub mod pipeline;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EtlConfig, EtlConfigBuilder};
pub use connectors::VendorConnector;
pub use error::{EtlError, GeoError, PathError};
pub use etl::{run_vendor_etl, EtlOutput, EtlStats};
pub use extract::{extract, records_to_table, SelectorRule, SelectorSpec};
pub use geo::{Geocoder, GeoResult};
pub use table::{Table, Value};
