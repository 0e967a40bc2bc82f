/// IEM (Iowa Environmental Mesonet) ASOS Archive Client
///
/// Downloads historical ASOS (Automated Surface Observing System) reports
/// from the Iowa State University Mesonet and parses the comma-delimited
/// response into `RawObservation`s for the normalizer.
///
/// API Documentation: https://mesonet.agron.iastate.edu/request/download.phtml

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::model::{FluxError, RawObservation, Result, SkyCode};

pub const IEM_BASE_URL: &str = "https://mesonet.agron.iastate.edu";

/// Token the archive uses for a missing value.
pub const MISSING_TOKEN: &str = "M";

/// Columns that must be present in the header for a batch to be usable.
const REQUIRED_COLUMNS: &[&str] = &["valid", "alti", "tmpf", "dwpf", "relh", "sknt", "drct"];

const SKY_COLUMNS: [&str; 4] = ["skyc1", "skyc2", "skyc3", "skyc4"];

// ============================================================================
// Parse results
// ============================================================================

/// A data line that could not be turned into an observation.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// 1-based line number in the response body.
    pub line: usize,
    pub reason: String,
}

/// Outcome of parsing one archive response.
///
/// Individual bad lines are tagged in `rejected` instead of failing the
/// whole batch.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub observations: Vec<RawObservation>,
    pub rejected: Vec<RejectedRow>,
    /// Numeric fields that were neither a number nor a missing token.
    pub malformed_values: usize,
}

// ============================================================================
// Request construction and download
// ============================================================================

/// Parse a request date given as `YYYYMMDD` (e.g. `19990201` for 2 Feb 1999).
pub fn parse_request_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d")
        .map_err(|e| FluxError::Config(format!("invalid date '{}' (expected YYYYMMDD): {}", s, e)))
}

/// Build the ASOS archive request URL for a station and date range.
///
/// All variables are requested, timestamps in UTC, with station coordinates.
pub fn build_asos_url(base_url: &str, station_id: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}/cgi-bin/request/asos.py?data=all&tz=Etc/UTC&format=comma&latlon=yes&year1={}&month1={}&day1={}&year2={}&month2={}&day2={}&station={}",
        base_url.trim_end_matches('/'),
        start.format("%Y"),
        start.format("%m"),
        start.format("%d"),
        end.format("%Y"),
        end.format("%m"),
        end.format("%d"),
        station_id
    )
}

/// Download the raw ASOS record for a station and date range.
///
/// Returns the response body unparsed so that callers can save it as-is.
pub fn fetch_asos_csv(
    client: &reqwest::blocking::Client,
    base_url: &str,
    station_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<String> {
    let url = build_asos_url(base_url, station_id, start, end);

    let response = client
        .get(&url)
        .send()
        .map_err(|e| FluxError::external("IEM", format!("Request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(FluxError::external("IEM", format!("HTTP {}", response.status())));
    }

    let text = response
        .text()
        .map_err(|e| FluxError::external("IEM", format!("Request failed: {}", e)))?;

    if text.lines().all(|l| l.trim().is_empty() || l.starts_with('#')) {
        return Err(FluxError::external(
            "IEM",
            format!("no data returned for station {}", station_id),
        ));
    }

    Ok(text)
}

/// Build a blocking HTTP client with the given request timeout.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| FluxError::Config(format!("failed to build HTTP client: {}", e)))
}

// ============================================================================
// CSV parsing
// ============================================================================

/// Parse an IEM ASOS comma-delimited response.
///
/// Lines starting with `#` (debug/comment lines) are skipped; the first
/// remaining line is the header, and columns are located by name. A header
/// lacking any required column is an input format error for the batch.
pub fn parse_asos_csv(csv: &str) -> Result<ParsedBatch> {
    let mut lines = csv
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.starts_with('#') && !line.trim().is_empty());

    let (_, header_line) = lines
        .next()
        .ok_or_else(|| FluxError::InputFormat("response contains no header line".to_string()))?;

    let columns: HashMap<&str, usize> = header_line
        .split(',')
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|name| !columns.contains_key(name))
        .collect();
    if !missing.is_empty() {
        return Err(FluxError::InputFormat(format!(
            "header is missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let width = columns.values().copied().max().map(|m| m + 1).unwrap_or(0);
    let mut batch = ParsedBatch::default();

    for (index, line) in lines {
        let line_no = index + 1;
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < width {
            batch.rejected.push(RejectedRow {
                line: line_no,
                reason: format!("expected {} fields, found {}", width, fields.len()),
            });
            continue;
        }

        let field = |name: &str| columns.get(name).map(|&i| fields[i].trim());

        let valid = field("valid").unwrap_or_default();
        let timestamp = match parse_timestamp(valid) {
            Some(ts) => ts,
            None => {
                batch.rejected.push(RejectedRow {
                    line: line_no,
                    reason: format!("unparseable timestamp '{}'", valid),
                });
                continue;
            }
        };

        let mut numeric = |name: &str| -> Option<f64> {
            let raw = field(name)?;
            match parse_value(raw) {
                Ok(v) => v,
                Err(()) => {
                    batch.malformed_values += 1;
                    None
                }
            }
        };

        let latitude = numeric("lat");
        let longitude = numeric("lon");
        let altimeter_in_hg = numeric("alti");
        let temp_f = numeric("tmpf");
        let dewpoint_f = numeric("dwpf");
        let relative_humidity = numeric("relh");
        let wind_speed_knots = numeric("sknt");
        let wind_direction_deg = numeric("drct");

        let sky_cover = SKY_COLUMNS.map(|name| field(name).and_then(SkyCode::from_token));

        batch.observations.push(RawObservation {
            station_id: field("station").unwrap_or_default().to_string(),
            timestamp,
            latitude,
            longitude,
            altimeter_in_hg,
            temp_f,
            dewpoint_f,
            relative_humidity,
            wind_speed_knots,
            wind_direction_deg,
            sky_cover,
        });
    }

    Ok(batch)
}

/// Parse a numeric field. `Ok(None)` for a missing token, `Err` for garbage.
fn parse_value(raw: &str) -> std::result::Result<Option<f64>, ()> {
    if raw.is_empty() || raw == MISSING_TOKEN || raw == "null" {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(|_| ())
}

/// Archive timestamps look like `2023-01-01 00:53` and are already UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
        .ok()
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

// ============================================================================
// Tests
// ============================================================================
