//! Energy aggregator.
//!
//! Combines the five flux series into the signed energy table, computes
//! the net flux per row, and removes incomplete timesteps. Also handles the
//! delimited-text and JSON exports of the finished table.

use std::io::Write;

use crate::model::{EnergyRow, EnergyTable, FluxSeries, Result, is_missing};

/// Column headers of the CSV export, index column first.
pub const CSV_HEADER: [&str; 7] = [
    "date",
    "downwelling SW",
    "downwelling LW",
    "upwelling LW",
    "sensible heat",
    "latent heat",
    "net flux",
];

/// Build the energy table from unsigned flux terms.
///
/// Upwelling longwave and latent heat are stored negated (losses from the
/// water); the net flux is the plain sum of the five signed columns. A row
/// with any missing term is dropped entirely. Series of unequal length are
/// an input format error.
pub fn aggregate(series: &FluxSeries) -> Result<EnergyTable> {
    series.check_aligned()?;
    let mut table = EnergyTable::default();

    for i in 0..series.len() {
        let downwelling_sw = series.shortwave[i];
        let downwelling_lw = series.longwave_down[i];
        let upwelling_lw = -series.longwave_up[i];
        let sensible_heat = series.sensible_heat[i];
        let latent_heat = -series.latent_heat[i];

        let terms = [downwelling_sw, downwelling_lw, upwelling_lw, sensible_heat, latent_heat];
        if terms.iter().any(|&v| is_missing(v)) {
            table.dropped += 1;
            continue;
        }

        table.rows.push(EnergyRow {
            date: series.timestamps[i],
            downwelling_sw,
            downwelling_lw,
            upwelling_lw,
            sensible_heat,
            latent_heat,
            net_flux: downwelling_sw + downwelling_lw + upwelling_lw + sensible_heat + latent_heat,
        });
    }

    Ok(table)
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Write the table as comma-delimited text with a header row.
pub fn write_csv<W: Write>(table: &EnergyTable, mut out: W) -> Result<()> {
    writeln!(out, "{}", CSV_HEADER.join(","))?;
    for row in &table.rows {
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            row.date.to_rfc3339(),
            row.downwelling_sw,
            row.downwelling_lw,
            row.upwelling_lw,
            row.sensible_heat,
            row.latent_heat,
            row.net_flux
        )?;
    }
    out.flush()?;
    Ok(())
}

/// CSV export as an in-memory string.
pub fn to_csv_string(table: &EnergyTable) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(table, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// JSON export: an array of row objects keyed by the CSV column names.
pub fn to_json(table: &EnergyTable) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&table.rows)
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Column means over the retained rows, for run reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergySummary {
    pub rows: usize,
    pub dropped: usize,
    pub mean_downwelling_sw: f64,
    pub mean_downwelling_lw: f64,
    pub mean_upwelling_lw: f64,
    pub mean_sensible_heat: f64,
    pub mean_latent_heat: f64,
    pub mean_net_flux: f64,
}

/// Summarize the table. Means are NaN when no rows were retained.
pub fn summarize(table: &EnergyTable) -> EnergySummary {
    let n = table.rows.len() as f64;
    let mean = |pick: fn(&EnergyRow) -> f64| table.rows.iter().map(pick).sum::<f64>() / n;

    EnergySummary {
        rows: table.rows.len(),
        dropped: table.dropped,
        mean_downwelling_sw: mean(|r| r.downwelling_sw),
        mean_downwelling_lw: mean(|r| r.downwelling_lw),
        mean_upwelling_lw: mean(|r| r.upwelling_lw),
        mean_sensible_heat: mean(|r| r.sensible_heat),
        mean_latent_heat: mean(|r| r.latent_heat),
        mean_net_flux: mean(|r| r.net_flux),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FluxError, MISSING};
    use chrono::{Duration, TimeZone, Utc};

    fn series(rows: &[[f64; 5]]) -> FluxSeries {
        let t0 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        FluxSeries {
            timestamps: (0..rows.len() as i64).map(|h| t0 + Duration::hours(h)).collect(),
            shortwave: rows.iter().map(|r| r[0]).collect(),
            longwave_down: rows.iter().map(|r| r[1]).collect(),
            longwave_up: rows.iter().map(|r| r[2]).collect(),
            sensible_heat: rows.iter().map(|r| r[3]).collect(),
            latent_heat: rows.iter().map(|r| r[4]).collect(),
        }
    }

    #[test]
    fn test_sign_convention() {
        let table = aggregate(&series(&[[100.0, 280.0, 320.0, 15.0, 40.0]])).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.downwelling_sw, 100.0);
        assert_eq!(row.downwelling_lw, 280.0);
        assert_eq!(row.upwelling_lw, -320.0);
        assert_eq!(row.sensible_heat, 15.0);
        assert_eq!(row.latent_heat, -40.0);
        assert_eq!(row.net_flux, 35.0);
    }

    #[test]
    fn test_net_flux_equals_signed_sum_exactly() {
        let s = series(&[
            [612.37, 271.004, 319.862, 0.0211, 0.0093],
            [0.0, 250.1, 319.862, -0.00377, 0.0158],
            [1.0e-3, 1.0e3, 3.3e2, 1.1e-7, 7.7e-9],
        ]);
        let table = aggregate(&s).unwrap();
        for (i, row) in table.rows.iter().enumerate() {
            let expected = s.shortwave[i] + s.longwave_down[i] - s.longwave_up[i]
                + s.sensible_heat[i]
                - s.latent_heat[i];
            assert_eq!(row.net_flux, expected, "row {}", i);
        }
    }

    #[test]
    fn test_rows_with_any_missing_term_are_dropped() {
        let table = aggregate(&series(&[
            [100.0, 280.0, 320.0, 15.0, 40.0],
            [100.0, 280.0, 320.0, MISSING, MISSING],
            [MISSING, 280.0, 320.0, 15.0, 40.0],
            [0.0, 281.0, 320.0, 14.0, 41.0],
        ])).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.dropped, 2);
        assert!(table.rows.iter().all(|r| !r.net_flux.is_nan()));
        assert_eq!(table.rows[1].date, Utc.with_ymd_and_hms(2023, 1, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_all_missing_gives_empty_table() {
        let table = aggregate(&series(&[[MISSING; 5], [MISSING; 5]])).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.dropped, 2);
    }

    #[test]
    fn test_csv_export() {
        let table = aggregate(&series(&[[100.0, 280.0, 320.0, 15.0, 40.0]])).unwrap();
        let csv = to_csv_string(&table).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("date,downwelling SW,downwelling LW,upwelling LW,sensible heat,latent heat,net flux")
        );
        assert_eq!(lines.next(), Some("2023-01-01T00:00:00+00:00,100,280,-320,15,-40,35"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_json_export_uses_column_names() {
        let table = aggregate(&series(&[[100.0, 280.0, 320.0, 15.0, 40.0]])).unwrap();
        let json: serde_json::Value = serde_json::from_str(&to_json(&table).unwrap()).unwrap();
        assert_eq!(json[0]["net flux"], 35.0);
        assert_eq!(json[0]["upwelling LW"], -320.0);
        assert_eq!(json[0]["date"], "2023-01-01T00:00:00Z");
    }

    #[test]
    fn test_summary() {
        let table = aggregate(&series(&[
            [100.0, 280.0, 320.0, 15.0, 40.0],
            [0.0, 260.0, 320.0, 5.0, 20.0],
            [MISSING, 260.0, 320.0, 5.0, 20.0],
        ])).unwrap();
        let summary = summarize(&table);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.mean_downwelling_sw, 50.0);
        assert_eq!(summary.mean_upwelling_lw, -320.0);
        assert_eq!(summary.mean_net_flux, (35.0 + -75.0) / 2.0);
    }

    #[test]
    fn test_uneven_series_is_an_input_error() {
        let mut s = series(&[[100.0, 280.0, 320.0, 15.0, 40.0], [0.0, 260.0, 320.0, 5.0, 20.0]]);
        s.shortwave.truncate(1);

        let err = aggregate(&s).unwrap_err();
        assert!(
            matches!(&err, FluxError::InputFormat(msg) if msg.contains("downwelling SW series has 1 values for 2 timestamps")),
            "got: {}",
            err
        );
        assert!(s.net_flux().is_err());

        s.shortwave.push(0.0);
        s.latent_heat.push(1.0);
        assert!(matches!(aggregate(&s), Err(FluxError::InputFormat(_))));
    }
}
