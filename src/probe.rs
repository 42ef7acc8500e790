//! HTTP redirect probe
//!
//! A stable virtual endpoint redirects `/scheduler` to the elected leader.
//! The probe issues one GET without following redirects and reads the leader
//! from the `Location` header.

use reqwest::header::LOCATION;
use reqwest::{redirect, Client};
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};
use crate::metrics;

/// Finds the leader by probing a redirecting endpoint
#[derive(Debug, Clone)]
pub struct ProbeFinder {
    scheduler_url: String,
    probe_path: String,
    client: Client,
}

impl ProbeFinder {
    /// Create a probe for `base`, requesting `<base><probe_path>`
    pub fn new(base: &str, probe_path: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        let probe_path = format!("/{}", probe_path.trim_start_matches('/'));

        Ok(Self {
            scheduler_url: format!("{}{}", base.trim_end_matches('/'), probe_path),
            probe_path,
            client,
        })
    }

    /// URL requested on every probe
    pub fn scheduler_url(&self) -> &str {
        &self.scheduler_url
    }

    /// Probe once and return the leader's base URL
    ///
    /// Without a `Location` header the endpoint is taken to be the leader and
    /// the probed URL is returned unchanged.
    pub async fn leader_url(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.scheduler_url)
            .send()
            .await
            .map_err(|e| {
                metrics::record_probe("error");
                Error::resolution_with_source(format!("probe of {} failed", self.scheduler_url), e)
            })?;

        let location = match response.headers().get(LOCATION) {
            Some(value) => Some(value.to_str().map_err(|e| {
                metrics::record_probe("error");
                Error::resolution_with_source("Location header is not valid text", e)
            })?),
            None => None,
        };

        match location.filter(|l| !l.is_empty()) {
            Some(location) => {
                let location = self.absolute(location)?;
                metrics::record_probe("redirect");
                tracing::debug!(location = %location, "leader redirect received");
                Ok(self.trim_probe_path(&location).to_string())
            }
            None => {
                metrics::record_probe("direct");
                tracing::debug!(
                    status = response.status().as_u16(),
                    "missing Location header in response"
                );
                Ok(self.scheduler_url.clone())
            }
        }
    }

    /// Resolve a relative `Location` against the probed URL
    fn absolute(&self, location: &str) -> Result<String> {
        match Url::parse(location) {
            Ok(_) => Ok(location.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&self.scheduler_url)
                .and_then(|base| base.join(location))
                .map(String::from)
                .map_err(|e| Error::resolution_with_source("invalid Location header", e)),
            Err(e) => Err(Error::resolution_with_source("invalid Location header", e)),
        }
    }

    /// Literal suffix trim, not path-segment aware
    fn trim_probe_path<'a>(&self, location: &'a str) -> &'a str {
        location
            .strip_suffix(self.probe_path.as_str())
            .unwrap_or(location)
    }
}
