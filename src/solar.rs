//! Clear-sky global horizontal irradiance.
//!
//! The flux engine only needs one capability from this module: a GHI value
//! per requested UTC instant for a fixed site. That capability is the
//! `ClearSkyProvider` trait, so runs can use the built-in Ineichen model,
//! a recorded series, or a constant.
//!
//! # Ineichen model
//!
//! 1. Solar position from UTC time and longitude (Spencer 1971 declination
//!    and equation of time).
//! 2. Relative air mass (Kasten & Young 1989), scaled to absolute air mass
//!    by the standard-atmosphere pressure at the site elevation.
//! 3. Extraterrestrial irradiance with Spencer's eccentricity correction.
//! 4. Ineichen & Perez (2002) GHI with a scalar Linke turbidity.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::model::{FluxError, Result};

/// Solar constant (W/m²).
pub const SOLAR_CONSTANT: f64 = 1366.1;

/// Sea-level standard pressure (Pa).
pub const STANDARD_PRESSURE_PA: f64 = 101_325.0;

/// Linke turbidity used when none is configured (typical rural continental air).
pub const DEFAULT_LINKE_TURBIDITY: f64 = 3.0;

/// Source of clear-sky GHI for a site.
///
/// Called once per flux computation with every timestamp of the run; the
/// returned series must be aligned with `times`.
pub trait ClearSkyProvider {
    fn clear_sky_ghi(
        &self,
        latitude: f64,
        longitude: f64,
        elevation_m: f64,
        times: &[DateTime<Utc>],
    ) -> Result<Vec<f64>>;
}

// ---------------------------------------------------------------------------
// Solar geometry
// ---------------------------------------------------------------------------

/// Sun position seen from the site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    /// Angle from the vertical, degrees.
    pub zenith_deg: f64,
    /// Angle above the horizon, degrees (90 − zenith).
    pub elevation_deg: f64,
}

impl SolarPosition {
    /// Sun position for a UTC instant at the given latitude/longitude (degrees,
    /// east positive).
    pub fn at(latitude: f64, longitude: f64, time: DateTime<Utc>) -> Self {
        let gamma = day_angle(time.ordinal());

        let declination = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
            - 0.006758 * (2.0 * gamma).cos()
            + 0.000907 * (2.0 * gamma).sin()
            - 0.002697 * (3.0 * gamma).cos()
            + 0.00148 * (3.0 * gamma).sin();

        // minutes
        let equation_of_time = 229.18
            * (0.000075 + 0.001868 * gamma.cos()
                - 0.032077 * gamma.sin()
                - 0.014615 * (2.0 * gamma).cos()
                - 0.04089 * (2.0 * gamma).sin());

        let utc_minutes =
            time.hour() as f64 * 60.0 + time.minute() as f64 + time.second() as f64 / 60.0;
        let true_solar_minutes = utc_minutes + 4.0 * longitude + equation_of_time;
        let hour_angle = (true_solar_minutes / 4.0 - 180.0).to_radians();

        let lat = latitude.to_radians();
        let cos_zenith = (lat.sin() * declination.sin()
            + lat.cos() * declination.cos() * hour_angle.cos())
        .clamp(-1.0, 1.0);
        let zenith_deg = cos_zenith.acos().to_degrees();

        Self {
            zenith_deg,
            elevation_deg: 90.0 - zenith_deg,
        }
    }

    pub fn is_above_horizon(&self) -> bool {
        self.zenith_deg < 90.0
    }
}

/// Spencer's day angle in radians for a day of year (1-based).
fn day_angle(day_of_year: u32) -> f64 {
    2.0 * PI * (day_of_year as f64 - 1.0) / 365.0
}

/// Extraterrestrial normal irradiance for a day of year (W/m²).
pub fn extraterrestrial_irradiance(day_of_year: u32) -> f64 {
    let b = day_angle(day_of_year);
    SOLAR_CONSTANT
        * (1.00011 + 0.034221 * b.cos() + 0.00128 * b.sin() + 0.000719 * (2.0 * b).cos()
            + 0.000077 * (2.0 * b).sin())
}

/// Kasten & Young (1989) relative optical air mass. NaN below the horizon.
pub fn relative_airmass(zenith_deg: f64) -> f64 {
    if zenith_deg >= 90.0 {
        return f64::NAN;
    }
    1.0 / (zenith_deg.to_radians().cos() + 0.50572 * (6.07995 + (90.0 - zenith_deg)).powf(-1.6364))
}

/// Standard-atmosphere pressure (Pa) at an altitude in meters.
pub fn altitude_to_pressure(altitude_m: f64) -> f64 {
    100.0 * ((44331.514 - altitude_m) / 11880.516).powf(1.0 / 0.1902632)
}

/// Relative air mass corrected for site pressure.
pub fn absolute_airmass(relative: f64, pressure_pa: f64) -> f64 {
    relative * pressure_pa / STANDARD_PRESSURE_PA
}

/// Ineichen & Perez clear-sky GHI (W/m²). Zero when the sun is down.
pub fn ineichen_ghi(
    zenith_deg: f64,
    airmass_absolute: f64,
    linke_turbidity: f64,
    altitude_m: f64,
    dni_extra: f64,
) -> f64 {
    if zenith_deg >= 90.0 || airmass_absolute.is_nan() {
        return 0.0;
    }
    let cos_zenith = zenith_deg.to_radians().cos().max(0.0);

    let fh1 = (-altitude_m / 8000.0).exp();
    let fh2 = (-altitude_m / 1250.0).exp();
    let cg1 = 5.09e-5 * altitude_m + 0.868;
    let cg2 = 3.92e-5 * altitude_m + 0.0387;

    let attenuation = (-cg2 * airmass_absolute * (fh1 + fh2 * (linke_turbidity - 1.0))).exp();
    cg1 * dni_extra * cos_zenith * attenuation.max(0.0)
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Built-in clear-sky model; needs no network access.
#[derive(Debug, Clone, Copy)]
pub struct IneichenClearSky {
    pub linke_turbidity: f64,
}

impl Default for IneichenClearSky {
    fn default() -> Self {
        Self {
            linke_turbidity: DEFAULT_LINKE_TURBIDITY,
        }
    }
}

impl IneichenClearSky {
    pub fn new(linke_turbidity: f64) -> Self {
        Self { linke_turbidity }
    }

    /// GHI at a single instant.
    pub fn ghi_at(&self, latitude: f64, longitude: f64, elevation_m: f64, time: DateTime<Utc>) -> f64 {
        let position = SolarPosition::at(latitude, longitude, time);
        if !position.is_above_horizon() {
            return 0.0;
        }
        let airmass = absolute_airmass(
            relative_airmass(position.zenith_deg),
            altitude_to_pressure(elevation_m),
        );
        ineichen_ghi(
            position.zenith_deg,
            airmass,
            self.linke_turbidity,
            elevation_m,
            extraterrestrial_irradiance(time.ordinal()),
        )
    }
}

impl ClearSkyProvider for IneichenClearSky {
    fn clear_sky_ghi(
        &self,
        latitude: f64,
        longitude: f64,
        elevation_m: f64,
        times: &[DateTime<Utc>],
    ) -> Result<Vec<f64>> {
        if !(0.0..=10.0).contains(&self.linke_turbidity) {
            return Err(FluxError::external(
                "clear-sky",
                format!("Linke turbidity {} outside [0, 10]", self.linke_turbidity),
            ));
        }
        Ok(times
            .iter()
            .map(|&t| self.ghi_at(latitude, longitude, elevation_m, t))
            .collect())
    }
}

/// The same GHI for every timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedClearSky(pub f64);

impl ClearSkyProvider for FixedClearSky {
    fn clear_sky_ghi(&self, _: f64, _: f64, _: f64, times: &[DateTime<Utc>]) -> Result<Vec<f64>> {
        Ok(vec![self.0; times.len()])
    }
}

/// Previously obtained GHI values keyed by timestamp.
///
/// A requested timestamp with no recorded value means the recording does
/// not cover the run, which is an external service error.
#[derive(Debug, Clone, Default)]
pub struct RecordedClearSky {
    values: BTreeMap<DateTime<Utc>, f64>,
}

impl RecordedClearSky {
    pub fn new(values: impl IntoIterator<Item = (DateTime<Utc>, f64)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl ClearSkyProvider for RecordedClearSky {
    fn clear_sky_ghi(&self, _: f64, _: f64, _: f64, times: &[DateTime<Utc>]) -> Result<Vec<f64>> {
        times
            .iter()
            .map(|t| {
                self.values.get(t).copied().ok_or_else(|| {
                    FluxError::external("clear-sky", format!("no data recorded for {}", t.to_rfc3339()))
                })
            })
            .collect()
    }
}
