/// Integration tests for the full heat-flux pipeline
///
/// Tests verify:
/// 1. An archive-format record flows from parsing to the energy table
/// 2. Hand-computed flux values for a steady 24-hour record
/// 3. Missing observations drop only their own timestep
/// 4. Runs are repeatable and both vapor-pressure strategies are honored
///
/// All external services are replaced by fixed providers; no network access.
///
/// Run with: cargo test --test pipeline_integration

use chrono::{TimeZone, Utc};
use heatflux_service::energy;
use heatflux_service::ingest::elevation::FixedElevation;
use heatflux_service::ingest::iem;
use heatflux_service::model::{FluxError, FluxParameters, RawObservation, VaporPressureMethod};
use heatflux_service::pipeline::{self, SiteRequest};
use heatflux_service::solar::{FixedClearSky, IneichenClearSky, RecordedClearSky};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const HEADER: &str = "station,valid,lon,lat,tmpf,dwpf,relh,drct,sknt,p01i,alti,mslp,vsby,gust,skyc1,skyc2,skyc3,skyc4,skyl1,skyl2,skyl3,skyl4,wxcodes";

/// 50 °F air, 41 °F dewpoint, 50 % RH, 4 kt wind, 29.92 inHg, clear sky.
fn steady_row(hour: u32) -> String {
    format!(
        "OGA,2023-01-01 {:02}:53,-101.7694,41.1194,50.00,41.00,50.00,340.00,4.00,0.00,29.92,M,10.00,M,CLR,M,M,M,M,M,M,M,M",
        hour
    )
}

fn archive(rows: &[String]) -> String {
    let mut csv = String::from("#DEBUG: Format Typ    -> comma\n");
    csv.push_str(HEADER);
    csv.push('\n');
    for row in rows {
        csv.push_str(row);
        csv.push('\n');
    }
    csv
}

fn steady_day() -> Vec<RawObservation> {
    let rows: Vec<String> = (0..24).map(steady_row).collect();
    let batch = iem::parse_asos_csv(&archive(&rows)).expect("fixture parses");
    assert!(batch.rejected.is_empty());
    batch.observations
}

fn request() -> SiteRequest {
    SiteRequest {
        latitude: None,
        longitude: None,
        elevation_m: None,
        water_temp_c: 3.0,
    }
}

fn assert_close(actual: f64, expected: f64, tolerance: f64, what: &str) {
    assert!(
        (actual - expected).abs() < tolerance,
        "{}: expected {} ± {}, got {}",
        what,
        expected,
        tolerance,
        actual
    );
}

// ---------------------------------------------------------------------------
// End-to-end values
// ---------------------------------------------------------------------------

#[test]
fn test_steady_day_with_relative_humidity() {
    let params = FluxParameters::new(VaporPressureMethod::RelativeHumidity);
    let output = pipeline::run(
        &steady_day(),
        &request(),
        &params,
        &FixedElevation(1000.0),
        &FixedClearSky(0.0),
    )
    .expect("run succeeds");

    assert_eq!(output.energy.len(), 24);
    assert_eq!(output.energy.dropped, 0);
    assert_eq!(output.site.latitude, 41.1194);
    assert_eq!(output.site.longitude, -101.7694);

    for row in &output.energy.rows {
        assert_eq!(row.downwelling_sw, 0.0);
        assert_close(row.downwelling_lw, 273.810_894, 1e-5, "downwelling LW");
        assert_close(row.upwelling_lw, -319.862_746, 1e-5, "upwelling LW");
        assert_close(row.sensible_heat, 21.407_68, 1e-6, "sensible heat");
        assert_close(row.latent_heat, -17.608_424, 1e-5, "latent heat");
        assert_close(row.net_flux, -42.252_596, 1e-5, "net flux");
    }
}

#[test]
fn test_steady_day_with_dewpoint() {
    let params = FluxParameters::new(VaporPressureMethod::Dewpoint);
    let output = pipeline::run(
        &steady_day(),
        &request(),
        &params,
        &FixedElevation(1000.0),
        &FixedClearSky(0.0),
    )
    .expect("run succeeds");

    // Dewpoint vapor pressure exceeds saturation at 3 °C water: condensation.
    let row = &output.energy.rows[0];
    assert_close(row.latent_heat, 5.377_745, 1e-5, "latent heat");
    assert_close(row.net_flux, -19.266_427, 1e-5, "net flux");
}

#[test]
fn test_strategies_give_different_latent_heat() {
    let raw = steady_day();
    let rh = pipeline::run(
        &raw,
        &request(),
        &FluxParameters::new(VaporPressureMethod::RelativeHumidity),
        &FixedElevation(1000.0),
        &FixedClearSky(0.0),
    )
    .unwrap();
    let dp = pipeline::run(
        &raw,
        &request(),
        &FluxParameters::new(VaporPressureMethod::Dewpoint),
        &FixedElevation(1000.0),
        &FixedClearSky(0.0),
    )
    .unwrap();

    assert_ne!(rh.fluxes.latent_heat, dp.fluxes.latent_heat);
    assert_eq!(rh.fluxes.sensible_heat, dp.fluxes.sensible_heat);
}

#[test]
fn test_shortwave_follows_clear_sky_and_cloud_cover() {
    let mut rows: Vec<String> = (0..2).map(steady_row).collect();
    rows[1] = rows[1].replace(",CLR,", ",OVC,");
    let raw = iem::parse_asos_csv(&archive(&rows)).unwrap().observations;

    let output = pipeline::run(
        &raw,
        &request(),
        &FluxParameters::new(VaporPressureMethod::RelativeHumidity),
        &FixedElevation(1000.0),
        &FixedClearSky(500.0),
    )
    .unwrap();

    assert_close(output.energy.rows[0].downwelling_sw, 425.0, 1e-9, "clear");
    assert_close(output.energy.rows[1].downwelling_sw, 148.75, 1e-9, "overcast");
}

#[test]
fn test_ineichen_provider_in_pipeline() {
    let output = pipeline::run(
        &steady_day(),
        &request(),
        &FluxParameters::new(VaporPressureMethod::RelativeHumidity),
        &FixedElevation(1000.0),
        &IneichenClearSky::new(3.0),
    )
    .unwrap();

    assert_eq!(output.energy.len(), 24);
    // 2023-01-01 in Nebraska: night until ~14 UTC, daylight around 19 UTC.
    assert_eq!(output.energy.rows[6].downwelling_sw, 0.0);
    assert!(output.energy.rows[19].downwelling_sw > 100.0);
    assert!(output.energy.rows.iter().all(|r| r.downwelling_sw >= 0.0));
}

// ---------------------------------------------------------------------------
// Missing data
// ---------------------------------------------------------------------------

#[test]
fn test_missing_wind_drops_only_that_timestep() {
    let mut rows: Vec<String> = (0..24).map(steady_row).collect();
    rows[5] = rows[5].replace(",340.00,4.00,", ",340.00,M,");
    let raw = iem::parse_asos_csv(&archive(&rows)).unwrap().observations;

    let output = pipeline::run(
        &raw,
        &request(),
        &FluxParameters::new(VaporPressureMethod::RelativeHumidity),
        &FixedElevation(1000.0),
        &FixedClearSky(0.0),
    )
    .unwrap();

    assert_eq!(output.fluxes.len(), 24);
    assert!(output.fluxes.sensible_heat[5].is_nan());
    assert!(output.fluxes.latent_heat[5].is_nan());
    assert_eq!(output.energy.len(), 23);
    assert_eq!(output.energy.dropped, 1);
    let dropped_time = Utc.with_ymd_and_hms(2023, 1, 1, 5, 53, 0).unwrap();
    assert!(output.energy.rows.iter().all(|r| r.date != dropped_time));
}

#[test]
fn test_missing_sky_cover_drops_radiation_rows() {
    let mut rows: Vec<String> = (0..3).map(steady_row).collect();
    rows[1] = rows[1].replace(",CLR,", ",M,");
    let raw = iem::parse_asos_csv(&archive(&rows)).unwrap().observations;

    let output = pipeline::run(
        &raw,
        &request(),
        &FluxParameters::new(VaporPressureMethod::RelativeHumidity),
        &FixedElevation(1000.0),
        &FixedClearSky(0.0),
    )
    .unwrap();

    assert_eq!(output.report.rows_without_cloudiness, 1);
    assert!(output.fluxes.longwave_down[1].is_nan());
    assert_eq!(output.energy.len(), 2);
}

#[test]
fn test_bad_lines_are_rejected_not_fatal() {
    let mut rows: Vec<String> = (0..3).map(steady_row).collect();
    rows.push("OGA,not-a-date,-101.7694,41.1194,50.00".to_string());
    let batch = iem::parse_asos_csv(&archive(&rows)).unwrap();
    assert_eq!(batch.observations.len(), 3);
    assert_eq!(batch.rejected.len(), 1);
}

#[test]
fn test_every_line_rejected_gives_empty_table() {
    let rows = vec![steady_row(0).replace("2023-01-01 00:53", "garbage")];
    let batch = iem::parse_asos_csv(&archive(&rows)).unwrap();
    assert_eq!(batch.rejected.len(), 1);

    let output = pipeline::run(
        &batch.observations,
        &request(),
        &FluxParameters::new(VaporPressureMethod::RelativeHumidity),
        &FixedElevation(1000.0),
        &FixedClearSky(0.0),
    )
    .expect("an empty batch is not an error");
    assert!(output.energy.is_empty());
    assert_eq!(energy::to_csv_string(&output.energy).unwrap().lines().count(), 1);
}

#[test]
fn test_header_without_wind_column_fails_batch() {
    let csv = "station,valid,lon,lat,tmpf,dwpf,relh,drct,alti\nOGA,2023-01-01 00:53,-101.7,41.1,50,41,50,340,29.92\n";
    let err = iem::parse_asos_csv(csv).unwrap_err();
    assert!(matches!(err, FluxError::InputFormat(msg) if msg.contains("sknt")));
}

// ---------------------------------------------------------------------------
// Providers and repeatability
// ---------------------------------------------------------------------------

#[test]
fn test_recording_gap_aborts_run() {
    let raw = steady_day();
    let recorded = RecordedClearSky::new(raw.iter().take(12).map(|o| (o.timestamp, 0.0)));
    let err = pipeline::run(
        &raw,
        &request(),
        &FluxParameters::new(VaporPressureMethod::RelativeHumidity),
        &FixedElevation(1000.0),
        &recorded,
    )
    .unwrap_err();
    assert!(matches!(err, FluxError::ExternalService { .. }));
}

#[test]
fn test_runs_are_repeatable() {
    let raw = steady_day();
    let params = FluxParameters::new(VaporPressureMethod::RelativeHumidity);
    let first = pipeline::run(&raw, &request(), &params, &FixedElevation(1000.0), &IneichenClearSky::new(3.0)).unwrap();
    let second = pipeline::run(&raw, &request(), &params, &FixedElevation(1000.0), &IneichenClearSky::new(3.0)).unwrap();
    assert_eq!(first.energy, second.energy);
    assert_eq!(
        energy::to_csv_string(&first.energy).unwrap(),
        energy::to_csv_string(&second.energy).unwrap()
    );
}

#[test]
fn test_csv_export_of_run() {
    let output = pipeline::run(
        &steady_day(),
        &request(),
        &FluxParameters::new(VaporPressureMethod::RelativeHumidity),
        &FixedElevation(1000.0),
        &FixedClearSky(0.0),
    )
    .unwrap();

    let csv = energy::to_csv_string(&output.energy).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 25);
    assert!(lines[0].starts_with("date,downwelling SW"));
    assert!(lines[1].starts_with("2023-01-01T00:53:00+00:00,0,"));
}
