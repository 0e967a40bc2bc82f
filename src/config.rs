//! Site/run configuration.
//!
//! A run is described by a TOML file (see `heatflux.example.toml`):
//! which station and period to fetch, where the water body is, its
//! temperature, the wind-function tuning, and which vapor-pressure
//! strategy to use. Service URLs can be overridden from the environment
//! (a `.env` file is honored by the binary).

use std::path::Path;

use serde::Deserialize;

use crate::ingest::elevation::OPENTOPODATA_BASE_URL;
use crate::ingest::iem::IEM_BASE_URL;
use crate::logging::LogLevel;
use crate::model::{
    DEFAULT_SHORTWAVE_REFLECTIVITY, FluxError, FluxParameters, Result, VaporPressureMethod,
    WindFunction,
};
use crate::pipeline::SiteRequest;
use crate::solar::DEFAULT_LINKE_TURBIDITY;

/// Environment variable overriding the IEM base URL.
pub const ENV_IEM_URL: &str = "HEATFLUX_IEM_URL";

/// Environment variable overriding the elevation service base URL.
pub const ENV_ELEVATION_URL: &str = "HEATFLUX_ELEVATION_URL";

// ---------------------------------------------------------------------------
// File structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// ASOS station identifier, e.g. "OGA".
    pub station: Option<String>,
    /// First day to download, `YYYYMMDD`.
    pub start: Option<String>,
    /// Last day to download, `YYYYMMDD`.
    pub end: Option<String>,

    /// Site coordinates; default to the coordinates in the station record.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Known site elevation (m); skips the elevation lookup when set.
    pub elevation_m: Option<f64>,

    /// Average water temperature for the run (°C).
    pub water_temperature_c: f64,

    /// Must be given explicitly: `relative_humidity` or `dewpoint`.
    pub vapor_pressure: VaporPressureMethod,

    #[serde(default = "default_reflectivity")]
    pub shortwave_reflectivity: f64,

    #[serde(default)]
    pub wind_function: WindFunction,

    #[serde(default)]
    pub solar: SolarConfig,

    #[serde(default)]
    pub services: ServiceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolarConfig {
    pub linke_turbidity: f64,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            linke_turbidity: DEFAULT_LINKE_TURBIDITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub iem_base_url: String,
    pub elevation_base_url: String,
    /// Per-request timeout for both services.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            iem_base_url: IEM_BASE_URL.to_string(),
            elevation_base_url: OPENTOPODATA_BASE_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: false,
        }
    }
}

fn default_reflectivity() -> f64 {
    DEFAULT_SHORTWAVE_REFLECTIVITY
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read and validate a site file.
pub fn load_config(path: impl AsRef<Path>) -> Result<SiteConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| FluxError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    SiteConfig::from_toml_str(&content)
}

impl SiteConfig {
    /// Parse and validate TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SiteConfig =
            toml::from_str(content).map_err(|e| FluxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Replace service URLs with explicit overrides where given.
    pub fn apply_overrides(&mut self, iem_url: Option<String>, elevation_url: Option<String>) {
        if let Some(url) = iem_url {
            self.services.iem_base_url = url;
        }
        if let Some(url) = elevation_url {
            self.services.elevation_base_url = url;
        }
    }

    /// Apply `HEATFLUX_IEM_URL` / `HEATFLUX_ELEVATION_URL` if set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_IEM_URL).ok(),
            std::env::var(ENV_ELEVATION_URL).ok(),
        );
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(FluxError::Config(format!("latitude {} outside [-90, 90]", lat)));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(FluxError::Config(format!("longitude {} outside [-180, 180]", lon)));
            }
        }
        if !self.water_temperature_c.is_finite() {
            return Err(FluxError::Config("water_temperature_c must be a finite number".to_string()));
        }
        if !(0.0..=1.0).contains(&self.shortwave_reflectivity) {
            return Err(FluxError::Config(format!(
                "shortwave_reflectivity {} outside [0, 1]",
                self.shortwave_reflectivity
            )));
        }
        let wf = &self.wind_function;
        if ![wf.a, wf.b, wf.c, wf.scale].iter().all(|v| v.is_finite()) {
            return Err(FluxError::Config("wind_function coefficients must be finite".to_string()));
        }
        if self.services.timeout_secs == 0 {
            return Err(FluxError::Config("services.timeout_secs must be positive".to_string()));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<LogLevel> {
        self.logging.level.parse().map_err(FluxError::Config)
    }

    pub fn flux_parameters(&self) -> FluxParameters {
        FluxParameters {
            shortwave_reflectivity: self.shortwave_reflectivity,
            wind_function: self.wind_function,
            vapor_pressure: self.vapor_pressure,
        }
    }

    pub fn site_request(&self) -> SiteRequest {
        SiteRequest {
            latitude: self.latitude,
            longitude: self.longitude,
            elevation_m: self.elevation_m,
            water_temp_c: self.water_temperature_c,
        }
    }
}
