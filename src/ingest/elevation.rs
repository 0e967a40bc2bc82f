/// Site elevation lookup.
///
/// The flux engine needs the ground elevation of the site to scale the
/// clear-sky air mass. Elevation comes from an injected `ElevationProvider`
/// so runs can be reproduced offline with a known value.
///
/// API Documentation: https://www.opentopodata.org/api/

use serde::Deserialize;

use crate::model::{FluxError, Result};

pub const OPENTOPODATA_BASE_URL: &str = "https://api.opentopodata.org";

/// USGS National Elevation Dataset, 1/3 arc-second (~10 m), CONUS only.
pub const DEFAULT_DATASET: &str = "ned10m";

/// Anything that can report ground elevation (meters) for a coordinate.
pub trait ElevationProvider {
    fn elevation(&self, latitude: f64, longitude: f64) -> Result<f64>;
}

// ---------------------------------------------------------------------------
// OpenTopoData
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OpenTopoResponse {
    #[serde(default)]
    results: Vec<OpenTopoResult>,
    status: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenTopoResult {
    elevation: Option<f64>,
}

/// Blocking client for the OpenTopoData elevation API.
pub struct OpenTopoData {
    client: reqwest::blocking::Client,
    base_url: String,
    dataset: String,
}

impl OpenTopoData {
    pub fn new(client: reqwest::blocking::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            dataset: DEFAULT_DATASET.to_string(),
        }
    }

    pub fn with_dataset(mut self, dataset: &str) -> Self {
        self.dataset = dataset.to_string();
        self
    }

    pub fn lookup_url(&self, latitude: f64, longitude: f64) -> String {
        format!(
            "{}/v1/{}?locations={},{}",
            self.base_url, self.dataset, latitude, longitude
        )
    }
}

impl ElevationProvider for OpenTopoData {
    fn elevation(&self, latitude: f64, longitude: f64) -> Result<f64> {
        let url = self.lookup_url(latitude, longitude);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| FluxError::external("OpenTopoData", format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FluxError::external(
                "OpenTopoData",
                format!("HTTP {}", response.status()),
            ));
        }

        let body = response
            .text()
            .map_err(|e| FluxError::external("OpenTopoData", format!("Request failed: {}", e)))?;

        parse_elevation_response(&body)
    }
}

/// Extract the first elevation from an OpenTopoData JSON body.
///
/// Points outside the dataset come back with `"elevation": null`; that is
/// reported as an external service error, never as a zero elevation.
pub fn parse_elevation_response(body: &str) -> Result<f64> {
    let parsed: OpenTopoResponse = serde_json::from_str(body)
        .map_err(|e| FluxError::external("OpenTopoData", format!("Parse error: {}", e)))?;

    if let Some(status) = parsed.status.as_deref() {
        if status != "OK" {
            let detail = parsed.error.unwrap_or_else(|| status.to_string());
            return Err(FluxError::external("OpenTopoData", detail));
        }
    }

    parsed
        .results
        .first()
        .ok_or_else(|| FluxError::external("OpenTopoData", "no results returned"))?
        .elevation
        .ok_or_else(|| FluxError::external("OpenTopoData", "no data for location (outside dataset)"))
}

// ---------------------------------------------------------------------------
// Fixed elevation
// ---------------------------------------------------------------------------

/// A known elevation, used when the site file provides one or in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedElevation(pub f64);

impl ElevationProvider for FixedElevation {
    fn elevation(&self, _latitude: f64, _longitude: f64) -> Result<f64> {
        Ok(self.0)
    }
}
