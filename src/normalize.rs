//! Observation normalizer.
//!
//! Turns a batch of raw station reports (inHg, °F, knots, coded sky cover)
//! into a `NormalizedTable` in the units the flux engine expects, and
//! derives the cloudiness fraction from the reported cloud layers.
//!
//! Normalization never fails: missing raw values become NaN, unrecognized
//! sky codes are treated as absent layers and counted in the report.

use std::collections::{BTreeSet, HashSet};

use crate::logging::{self, DataSource};
use crate::model::{
    MISSING, NormalizedObservation, NormalizedTable, RawObservation, SkyCode, or_missing,
};

/// Millibars per inch of mercury.
pub const MB_PER_IN_HG: f64 = 33.8639;

/// Wind speed conversion used throughout the pipeline (m/s per knot).
/// Kept at 0.51 rather than 0.5144 so results match existing runs.
pub const MS_PER_KNOT: f64 = 0.51;

// ---------------------------------------------------------------------------
// Unit conversions
// ---------------------------------------------------------------------------

pub fn inhg_to_mb(in_hg: f64) -> f64 {
    in_hg * MB_PER_IN_HG
}

pub fn mb_to_inhg(mb: f64) -> f64 {
    mb / MB_PER_IN_HG
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn knots_to_ms(knots: f64) -> f64 {
    knots * MS_PER_KNOT
}

// ---------------------------------------------------------------------------
// Cloudiness
// ---------------------------------------------------------------------------

/// Largest coverage fraction among the reported layers.
///
/// Absent and unrecognized layers are skipped; if no layer has a value the
/// result is missing (NaN), not zero.
pub fn cloudiness(layers: &[Option<SkyCode>]) -> f64 {
    layers
        .iter()
        .flatten()
        .filter_map(SkyCode::coverage)
        .fold(MISSING, f64::max)
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Data-quality notes gathered while normalizing a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    pub rows: usize,
    /// Layers whose code was not recognized (each counted once per layer).
    pub unrecognized_sky_codes: usize,
    /// Distinct unrecognized tokens, sorted.
    pub unrecognized_tokens: Vec<String>,
    /// Rows where no layer produced a coverage value.
    pub rows_without_cloudiness: usize,
    /// Rows whose timestamp already appeared earlier in the batch.
    pub duplicate_timestamps: usize,
}

/// Output of the normalizer: the table and what was noticed along the way.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub table: NormalizedTable,
    pub report: NormalizeReport,
}

fn normalize_row(raw: &RawObservation) -> NormalizedObservation {
    let pressure_in_hg = or_missing(raw.altimeter_in_hg);
    let air_temp_f = or_missing(raw.temp_f);

    NormalizedObservation {
        timestamp: raw.timestamp,
        pressure_mb: inhg_to_mb(pressure_in_hg),
        pressure_in_hg,
        air_temp_c: fahrenheit_to_celsius(air_temp_f),
        air_temp_f,
        dewpoint_c: fahrenheit_to_celsius(or_missing(raw.dewpoint_f)),
        relative_humidity: or_missing(raw.relative_humidity),
        wind_speed_ms: knots_to_ms(or_missing(raw.wind_speed_knots)),
        wind_direction_deg: or_missing(raw.wind_direction_deg),
        cloudiness: cloudiness(&raw.sky_cover),
    }
}

/// Normalize a batch of raw reports, preserving their order.
pub fn normalize(raw: &[RawObservation]) -> Normalized {
    let mut report = NormalizeReport {
        rows: raw.len(),
        ..Default::default()
    };
    let mut tokens = BTreeSet::new();
    let mut seen = HashSet::with_capacity(raw.len());
    let mut rows = Vec::with_capacity(raw.len());

    for obs in raw {
        for code in obs.sky_cover.iter().flatten() {
            if let SkyCode::Unrecognized(token) = code {
                report.unrecognized_sky_codes += 1;
                tokens.insert(token.clone());
            }
        }
        if !seen.insert(obs.timestamp) {
            report.duplicate_timestamps += 1;
        }

        let row = normalize_row(obs);
        if row.cloudiness.is_nan() {
            report.rows_without_cloudiness += 1;
        }
        rows.push(row);
    }
    report.unrecognized_tokens = tokens.into_iter().collect();

    let station_id = raw
        .iter()
        .map(|o| o.station_id.as_str())
        .find(|s| !s.is_empty())
        .map(String::from);

    log_report(&report, station_id.as_deref());

    Normalized {
        table: NormalizedTable {
            station_id,
            latitude: raw.iter().find_map(|o| o.latitude),
            longitude: raw.iter().find_map(|o| o.longitude),
            rows,
        },
        report,
    }
}

fn log_report(report: &NormalizeReport, station: Option<&str>) {
    if report.unrecognized_sky_codes > 0 {
        logging::warn(
            DataSource::Normalizer,
            station,
            &format!(
                "{} unrecognized sky-cover code(s) treated as missing: {}",
                report.unrecognized_sky_codes,
                report.unrecognized_tokens.join(", ")
            ),
        );
    }
    if report.duplicate_timestamps > 0 {
        logging::warn(
            DataSource::Normalizer,
            station,
            &format!("{} duplicate timestamp(s) kept as reported", report.duplicate_timestamps),
        );
    }
    logging::debug(
        DataSource::Normalizer,
        station,
        &format!(
            "normalized {} rows ({} without cloudiness)",
            report.rows, report.rows_without_cloudiness
        ),
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
