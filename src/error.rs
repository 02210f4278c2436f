//! Error types for the uk-pubs-etl library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`EtlError`] — **Fatal**: the run cannot proceed (vendor endpoint
//!   unreachable, unreadable checkpoint artifact, geocoder not configured).
//!   Returned as `Err(EtlError)` from the pipeline and the top-level
//!   `run_vendor_etl` entry point. A stage that fails this way writes no
//!   artifact, so the run key stays resumable.
//!
//! * [`GeoError`] — **Non-fatal, per query**: one geocoding lookup failed
//!   (request error, bad upstream status, zero candidates). Absorbed into an
//!   absent entry in the batch result; sibling queries are unaffected.
//!
//! * [`PathError`] — **Non-fatal, per field**: one path expression in a
//!   selector spec could not be evaluated. Recorded as a diagnostic and the
//!   field becomes an explicit absent marker; extraction of the remaining
//!   fields continues.
//!
//! The separation lets callers decide their own tolerance: a bad selector
//! costs one column, a bad address costs one row's enrichment, and only a
//! broken stage costs the run — and even then only from that stage onward.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the uk-pubs-etl library.
///
/// Per-query geocoding failures use [`GeoError`] and per-field extraction
/// failures use [`PathError`]; neither is propagated here.
#[derive(Debug, Error)]
pub enum EtlError {
    // ── Vendor fetch errors ───────────────────────────────────────────────
    /// HTTP request to a vendor endpoint failed.
    #[error("Fetching {vendor} data failed: {reason}\nCheck your internet connection and whether the vendor site is up.")]
    FetchFailed { vendor: String, reason: String },

    /// A vendor response decoded, but its shape was not what the connector expects.
    #[error("Unexpected {vendor} payload: {detail}\nThe vendor may have changed their page or API format.")]
    VendorPayload { vendor: String, detail: String },

    // ── Checkpoint artifact errors ────────────────────────────────────────
    /// Could not create the working directory for run artifacts.
    #[error("Failed to create working directory '{path}': {source}")]
    WorkdirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint artifact exists but could not be read back as a table.
    #[error("Failed to read artifact '{path}': {detail}\nDelete the file to force the stage to recompute.")]
    ArtifactRead { path: PathBuf, detail: String },

    /// Could not persist a stage's output.
    #[error("Failed to write artifact '{path}': {detail}")]
    ArtifactWrite { path: PathBuf, detail: String },

    // ── Geocoder errors ───────────────────────────────────────────────────
    /// No geocoder was configured and none could be built from the environment.
    #[error("No geocoder configured.\n{hint}")]
    GeocoderNotConfigured { hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single geocoding query.
///
/// Stored as an absent entry in the batch result; the batch keeps a failure
/// count but never fails as a whole because of these.
#[derive(Debug, Clone, Error)]
pub enum GeoError {
    /// The upstream service returned zero candidates for the query.
    #[error("\"{query}\" rendered no candidates from the geocoder")]
    NoCandidates { query: String },

    /// The HTTP request itself failed (network, timeout, decode).
    #[error("Geocoding request for \"{query}\" failed: {detail}")]
    RequestFailed { query: String, detail: String },

    /// The service answered with a non-OK status field.
    #[error("Geocoder returned status {status} for \"{query}\"")]
    BadStatus { query: String, status: String },
}

/// A non-fatal error for a single path expression inside a selector spec.
#[derive(Debug, Clone, Error)]
#[error("Path expression '{path}' failed: {detail}")]
pub struct PathError {
    pub path: String,
    pub detail: String,
}

impl PathError {
    pub fn new(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
