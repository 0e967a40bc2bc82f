//! End-to-end run.
//!
//! Each stage takes the previous stage's output by value or reference and
//! returns a new value; nothing is kept between runs.
//!
//!   raw reports → normalize → resolve site (elevation) → compute fluxes
//!   (clear-sky) → aggregate → energy table

use crate::energy;
use crate::flux;
use crate::ingest::elevation::ElevationProvider;
use crate::logging::{self, DataSource};
use crate::model::{
    EnergyTable, FluxError, FluxParameters, FluxSeries, NormalizedTable, RawObservation, Result,
    SiteParameters, or_missing,
};
use crate::normalize::{self, NormalizeReport};
use crate::solar::ClearSkyProvider;

/// Site description as given by the caller; gaps are filled from the
/// observation record and the elevation provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation_m: Option<f64>,
    pub water_temp_c: f64,
}

/// Everything a run produced, stage by stage.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub normalized: NormalizedTable,
    pub report: NormalizeReport,
    pub site: SiteParameters,
    pub fluxes: FluxSeries,
    pub energy: EnergyTable,
}

/// Fill in coordinates and elevation for a site.
///
/// Coordinates come from the request, else from the station record. The
/// elevation provider is consulted only when the request has no elevation;
/// its failure aborts the run.
pub fn resolve_site(
    request: &SiteRequest,
    table: &NormalizedTable,
    elevation: &dyn ElevationProvider,
) -> Result<SiteParameters> {
    let station = table.station_id.as_deref();

    let latitude = request.latitude.or(table.latitude).ok_or_else(|| {
        FluxError::Config("no latitude configured and none in the station record".to_string())
    })?;
    let longitude = request.longitude.or(table.longitude).ok_or_else(|| {
        FluxError::Config("no longitude configured and none in the station record".to_string())
    })?;

    let elevation_m = match request.elevation_m {
        Some(e) => e,
        None => elevation
            .elevation(latitude, longitude)
            .inspect_err(|e| logging::log_service_failure(DataSource::Elevation, station, "elevation lookup", e))?,
    };

    logging::info(
        DataSource::Elevation,
        station,
        &format!("site {:.4}, {:.4} at {:.1} m", latitude, longitude, elevation_m),
    );

    Ok(SiteParameters {
        latitude,
        longitude,
        elevation_m,
        water_temp_c: request.water_temp_c,
    })
}

/// Run the whole pipeline on a batch of raw reports.
pub fn run(
    raw: &[RawObservation],
    request: &SiteRequest,
    params: &FluxParameters,
    elevation: &dyn ElevationProvider,
    clear_sky: &dyn ClearSkyProvider,
) -> Result<RunOutput> {
    let normalize::Normalized { table, report } = normalize::normalize(raw);

    // Nothing to compute: an empty table is a valid result, not a site error.
    if table.is_empty() {
        logging::log_run_summary(table.station_id.as_deref(), 0, 0, 0);
        let site = SiteParameters {
            latitude: or_missing(request.latitude),
            longitude: or_missing(request.longitude),
            elevation_m: or_missing(request.elevation_m),
            water_temp_c: request.water_temp_c,
        };
        return Ok(RunOutput {
            normalized: table,
            report,
            site,
            fluxes: FluxSeries::default(),
            energy: EnergyTable::default(),
        });
    }

    let site = resolve_site(request, &table, elevation)?;
    let fluxes = flux::compute_fluxes(&table, &site, params, clear_sky)?;
    let energy = energy::aggregate(&fluxes)?;

    logging::log_run_summary(table.station_id.as_deref(), fluxes.len(), energy.len(), energy.dropped);

    Ok(RunOutput {
        normalized: table,
        report,
        site,
        fluxes,
        energy,
    })
}
