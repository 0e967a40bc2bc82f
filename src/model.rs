/// Core data types for the water-surface heat flux service.
///
/// This module defines the shared domain model imported by all other modules:
/// raw station reports, the normalized observation table, site and tuning
/// parameters, the five flux series and the final energy table.
/// It contains no I/O and only the small amount of logic that belongs to the
/// types themselves (sky-code mapping, accessors).
///
/// Missing numeric values are `Option<f64>` in raw records and `f64::NAN`
/// everywhere downstream of the normalizer, so that gaps flow through the
/// flux formulas without special handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Missing values
// ---------------------------------------------------------------------------

/// Marker for a missing value in normalized and flux series.
pub const MISSING: f64 = f64::NAN;

/// Returns `true` if `value` marks a missing observation or result.
pub fn is_missing(value: f64) -> bool {
    value.is_nan()
}

/// Converts an optional raw value into the NaN-propagating representation.
pub fn or_missing(value: Option<f64>) -> f64 {
    value.unwrap_or(MISSING)
}

/// The pipeline always runs in UTC; clear-sky geometry is computed from
/// UTC instants and the site longitude.
pub const SITE_TIMEZONE: &str = "Etc/UTC";

// ---------------------------------------------------------------------------
// Sky cover
// ---------------------------------------------------------------------------

/// Coded sky-cover layer from a METAR-style report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkyCode {
    /// `CLR` or `SKC`
    Clear,
    /// `FEW` (1–2 oktas)
    Few,
    /// `SCT` (3–4 oktas)
    Scattered,
    /// `BKN` (5–7 oktas)
    Broken,
    /// `OVC` (8 oktas)
    Overcast,
    /// Any other token (e.g. `VV` vertical visibility). Maps to missing.
    Unrecognized(String),
}

impl SkyCode {
    /// Parses a sky-cover token.
    ///
    /// Returns `None` for an absent layer (empty field, `M` or `null`).
    pub fn from_token(token: &str) -> Option<SkyCode> {
        let token = token.trim();
        match token {
            "" | "M" | "null" => None,
            "CLR" | "SKC" => Some(SkyCode::Clear),
            "FEW" => Some(SkyCode::Few),
            "SCT" => Some(SkyCode::Scattered),
            "BKN" => Some(SkyCode::Broken),
            "OVC" => Some(SkyCode::Overcast),
            other => Some(SkyCode::Unrecognized(other.to_string())),
        }
    }

    /// Fraction of sky covered by this layer, or `None` when the code is
    /// not recognized.
    pub fn coverage(&self) -> Option<f64> {
        match self {
            SkyCode::Clear => Some(0.0),
            SkyCode::Few => Some(1.5 / 8.0),
            SkyCode::Scattered => Some(3.5 / 8.0),
            SkyCode::Broken => Some(6.0 / 8.0),
            SkyCode::Overcast => Some(1.0),
            SkyCode::Unrecognized(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Observation types
// ---------------------------------------------------------------------------

/// A single station report as delivered by the observation archive.
///
/// Units are those of the source: inches of mercury, degrees Fahrenheit,
/// knots. Any field may be missing except the timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub station_id: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altimeter_in_hg: Option<f64>,
    pub temp_f: Option<f64>,
    pub dewpoint_f: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub wind_speed_knots: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    /// Up to four reported cloud layers, lowest first.
    pub sky_cover: [Option<SkyCode>; 4],
}

/// One normalized row, indexed by its UTC timestamp. Missing values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedObservation {
    pub timestamp: DateTime<Utc>,
    pub pressure_mb: f64,
    pub pressure_in_hg: f64,
    pub air_temp_c: f64,
    pub air_temp_f: f64,
    pub dewpoint_c: f64,
    pub relative_humidity: f64,
    pub wind_speed_ms: f64,
    pub wind_direction_deg: f64,
    /// Sky coverage fraction in [0, 1], or NaN.
    pub cloudiness: f64,
}

/// Time-indexed table of normalized observations.
///
/// Rows keep the order of the raw batch; duplicate timestamps are kept as
/// reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub station_id: Option<String>,
    /// First latitude reported in the raw batch, if any.
    pub latitude: Option<f64>,
    /// First longitude reported in the raw batch, if any.
    pub longitude: Option<f64>,
    pub rows: Vec<NormalizedObservation>,
}

impl NormalizedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    /// Extracts one column as a series aligned to `timestamps()`.
    pub fn column(&self, pick: impl Fn(&NormalizedObservation) -> f64) -> Vec<f64> {
        self.rows.iter().map(pick).collect()
    }
}

// ---------------------------------------------------------------------------
// Site and tuning parameters
// ---------------------------------------------------------------------------

/// Location and water state for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteParameters {
    /// WGS84 latitude, degrees north.
    pub latitude: f64,
    /// WGS84 longitude, degrees east.
    pub longitude: f64,
    /// Ground elevation in meters.
    pub elevation_m: f64,
    /// Water surface temperature in °C, constant for the run.
    pub water_temp_c: f64,
}

/// Empirical wind function `f(U) = scale · (a + b·U^c)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindFunction {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub scale: f64,
}

impl Default for WindFunction {
    fn default() -> Self {
        Self {
            a: 1e-6,
            b: 1e-6,
            c: 1.0,
            scale: 1.0,
        }
    }
}

/// How actual vapor pressure `e_a` is obtained for the latent heat term.
///
/// The two strategies give different results and are never substituted for
/// one another silently; the caller picks one per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaporPressureMethod {
    /// `e_a = RH/100 · e_s(T_water)`
    RelativeHumidity,
    /// `e_a = 6.11 · 10^(7.5·T_dew / (237.3 + T_dew))`
    Dewpoint,
}

/// Default water reflectivity for shortwave radiation.
pub const DEFAULT_SHORTWAVE_REFLECTIVITY: f64 = 0.15;

/// Tuning parameters of the flux engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluxParameters {
    /// Fraction of incoming shortwave reflected by the water surface.
    pub shortwave_reflectivity: f64,
    pub wind_function: WindFunction,
    pub vapor_pressure: VaporPressureMethod,
}

impl FluxParameters {
    /// Default reflectivity and wind function with an explicit vapor
    /// pressure strategy.
    pub fn new(vapor_pressure: VaporPressureMethod) -> Self {
        Self {
            shortwave_reflectivity: DEFAULT_SHORTWAVE_REFLECTIVITY,
            wind_function: WindFunction::default(),
            vapor_pressure,
        }
    }
}

// ---------------------------------------------------------------------------
// Flux and energy types
// ---------------------------------------------------------------------------

/// The five flux terms in W/m², unsigned, aligned to `timestamps`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxSeries {
    pub timestamps: Vec<DateTime<Utc>>,
    pub shortwave: Vec<f64>,
    pub longwave_down: Vec<f64>,
    pub longwave_up: Vec<f64>,
    pub sensible_heat: Vec<f64>,
    pub latent_heat: Vec<f64>,
}

impl FluxSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Fails unless every flux column has one value per timestamp.
    pub fn check_aligned(&self) -> Result<()> {
        let columns = [
            ("downwelling SW", self.shortwave.len()),
            ("downwelling LW", self.longwave_down.len()),
            ("upwelling LW", self.longwave_up.len()),
            ("sensible heat", self.sensible_heat.len()),
            ("latent heat", self.latent_heat.len()),
        ];
        match columns.iter().find(|(_, len)| *len != self.len()) {
            Some((name, len)) => Err(FluxError::InputFormat(format!(
                "{} series has {} values for {} timestamps",
                name,
                len,
                self.len()
            ))),
            None => Ok(()),
        }
    }

    /// Engine-level net flux `q_sw + q_atm − q_b + q_h − q_l` per timestep.
    pub fn net_flux(&self) -> Result<Vec<f64>> {
        self.check_aligned()?;
        Ok((0..self.len())
            .map(|i| {
                self.shortwave[i] + self.longwave_down[i] - self.longwave_up[i]
                    + self.sensible_heat[i]
                    - self.latent_heat[i]
            })
            .collect())
    }
}

/// One complete row of the energy table. Loss terms are stored negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyRow {
    pub date: DateTime<Utc>,
    #[serde(rename = "downwelling SW")]
    pub downwelling_sw: f64,
    #[serde(rename = "downwelling LW")]
    pub downwelling_lw: f64,
    #[serde(rename = "upwelling LW")]
    pub upwelling_lw: f64,
    #[serde(rename = "sensible heat")]
    pub sensible_heat: f64,
    #[serde(rename = "latent heat")]
    pub latent_heat: f64,
    #[serde(rename = "net flux")]
    pub net_flux: f64,
}

/// Final artifact of a run: signed flux terms plus net flux, complete rows only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnergyTable {
    pub rows: Vec<EnergyRow>,
    /// Number of timesteps removed because at least one term was missing.
    #[serde(skip)]
    pub dropped: usize,
}

impl EnergyTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, FluxError>;

/// Errors that abort a run. Missing data is never an error; it shows up as
/// NaN in the series and as dropped rows in the energy table.
#[derive(Debug, thiserror::Error)]
pub enum FluxError {
    /// The raw record is structurally unusable (no header, required
    /// column absent).
    #[error("Input format error: {0}")]
    InputFormat(String),

    /// Elevation or irradiance lookup failed or returned no data.
    #[error("{service} error: {message}")]
    ExternalService { service: String, message: String },

    /// Invalid or incomplete run configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FluxError {
    pub fn external(service: &str, message: impl Into<String>) -> Self {
        FluxError::ExternalService {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sky_tokens_map_to_codes() {
        assert_eq!(SkyCode::from_token("CLR"), Some(SkyCode::Clear));
        assert_eq!(SkyCode::from_token("SKC"), Some(SkyCode::Clear));
        assert_eq!(SkyCode::from_token(" OVC "), Some(SkyCode::Overcast));
        assert_eq!(SkyCode::from_token("M"), None);
        assert_eq!(SkyCode::from_token(""), None);
        assert_eq!(
            SkyCode::from_token("VV"),
            Some(SkyCode::Unrecognized("VV".to_string()))
        );
    }

    #[test]
    fn test_sky_coverage_fractions() {
        assert_eq!(SkyCode::Clear.coverage(), Some(0.0));
        assert_eq!(SkyCode::Few.coverage(), Some(0.1875));
        assert_eq!(SkyCode::Scattered.coverage(), Some(0.4375));
        assert_eq!(SkyCode::Broken.coverage(), Some(0.75));
        assert_eq!(SkyCode::Overcast.coverage(), Some(1.0));
        assert_eq!(SkyCode::Unrecognized("VV".into()).coverage(), None);
    }

    #[test]
    fn test_flux_parameter_defaults() {
        let params = FluxParameters::new(VaporPressureMethod::Dewpoint);
        assert_eq!(params.shortwave_reflectivity, 0.15);
        assert_eq!(params.wind_function, WindFunction { a: 1e-6, b: 1e-6, c: 1.0, scale: 1.0 });
        assert_eq!(params.vapor_pressure, VaporPressureMethod::Dewpoint);
    }

    #[test]
    fn test_missing_helpers() {
        assert!(is_missing(MISSING));
        assert!(is_missing(or_missing(None)));
        assert!(!is_missing(or_missing(Some(1.0))));
    }

    #[test]
    fn test_external_error_display() {
        let err = FluxError::external("OpenTopoData", "HTTP 503");
        assert_eq!(err.to_string(), "OpenTopoData error: HTTP 503");
    }
}
