//! Configuration for an ETL run.
//!
//! All run behaviour is controlled through [`EtlConfig`], built via its
//! [`EtlConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share a config between the CLI and library callers, and to log the
//! settings a run actually used when two runs disagree.
//!
//! # Design choice: builder over constructor
//! Most callers only care about one or two fields (an API key, a
//! concurrency override); the builder lets them set exactly those and rely
//! on documented defaults for the rest.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::EtlError;
use crate::geo::Geocoder;

/// Configuration for one ETL run.
///
/// Built via [`EtlConfig::builder()`] or [`EtlConfig::default()`].
///
/// # Example
/// ```rust
/// use uk_pubs_etl::EtlConfig;
///
/// let config = EtlConfig::builder()
///     .concurrency(20)
///     .api_key("AIza...")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct EtlConfig {
    /// Number of concurrent geocoding calls. Default: 50.
    ///
    /// Geocoding is network-bound; one request per listing serially makes
    /// the geo stage the slowest part of a run by far. Fifty in flight
    /// keeps a few-hundred-row batch under a minute. Lower this if the
    /// upstream service starts returning rate-limit statuses.
    pub concurrency: usize,

    /// Pre-constructed geocoder. Takes precedence over `api_key`.
    /// Useful in tests or when the caller wraps the client in caching.
    pub geocoder: Option<Arc<dyn Geocoder>>,

    /// Geocoding API key. If neither this nor `geocoder` is set, the key
    /// is read from the `GOOGLEMAPS_KEY` environment variable.
    pub api_key: Option<String>,

    /// User-Agent header for vendor page requests. Default: a desktop
    /// Firefox string.
    ///
    /// Several vendor sites answer a default library User-Agent with an
    /// empty page rather than an error status, which looks exactly like
    /// the normal end of pagination. A browser UA avoids that trap.
    pub user_agent: String,

    /// Per-request HTTP timeout in seconds, vendor and geocoder alike.
    /// Default: 30.
    pub request_timeout_secs: u64,

    /// Override the run date (and so the run key and `ScrapeDate` stamp).
    /// Default: today. Mostly useful to resume or inspect an older run.
    pub run_date: Option<NaiveDate>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            concurrency: 50,
            geocoder: None,
            api_key: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:91.0) \
                         Gecko/20100101 Firefox/91.0"
                .to_string(),
            request_timeout_secs: 30,
            run_date: None,
        }
    }
}

impl fmt::Debug for EtlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtlConfig")
            .field("concurrency", &self.concurrency)
            .field("geocoder", &self.geocoder.as_ref().map(|_| "<dyn Geocoder>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("run_date", &self.run_date)
            .finish()
    }
}

impl EtlConfig {
    /// Create a new builder for `EtlConfig`.
    pub fn builder() -> EtlConfigBuilder {
        EtlConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EtlConfig`].
#[derive(Debug)]
pub struct EtlConfigBuilder {
    config: EtlConfig,
}

impl EtlConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.config.geocoder = Some(geocoder);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn run_date(mut self, date: NaiveDate) -> Self {
        self.config.run_date = Some(date);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EtlConfig, EtlError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(EtlError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.request_timeout_secs == 0 {
            return Err(EtlError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
