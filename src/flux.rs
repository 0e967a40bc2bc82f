//! Flux engine.
//!
//! Pure functions for each surface energy term of a water body, plus
//! `compute_fluxes`, which evaluates all five over a normalized table.
//! Every formula works on plain `f64` values: a NaN input yields a NaN
//! result, which is how missing observations reach the energy table.
//!
//! Sign convention: all terms returned here are magnitudes in W/m². The
//! aggregator decides which ones are losses.

use crate::logging::{self, DataSource};
use crate::model::{
    FluxError, FluxParameters, FluxSeries, NormalizedTable, Result, SiteParameters,
    VaporPressureMethod, WindFunction,
};
use crate::solar::ClearSkyProvider;

/// Stefan–Boltzmann constant (W·m⁻²·K⁻⁴).
pub const STEFAN_BOLTZMANN: f64 = 5.670374419e-8;

/// 0 °C in kelvin.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Emissivity of the water surface.
pub const WATER_EMISSIVITY: f64 = 0.97;

/// Density of water (kg/m³).
pub const WATER_DENSITY: f64 = 1000.0;

/// Specific heat of air at constant pressure (J/(kg·K)).
pub const AIR_SPECIFIC_HEAT: f64 = 1006.0;

/// Ratio of molecular weights of water vapor and dry air.
pub const VAPOR_MASS_RATIO: f64 = 0.622;

/// Coefficients of the saturation vapor pressure polynomial in water
/// temperature (K), constant term first (Zhang & Johnson 2016).
const SATURATION_COEFFICIENTS: [f64; 7] = [
    6984.505294,
    -188.903931,
    2.133357675,
    -1.28858097e-2,
    4.393587233e-5,
    -8.023923082e-8,
    6.136820929e-11,
];

// ---------------------------------------------------------------------------
// Radiation
// ---------------------------------------------------------------------------

/// Net shortwave into the water from clear-sky GHI, attenuated by cloud
/// cover `cloudiness` ∈ [0, 1].
pub fn shortwave(ghi: f64, reflectivity: f64, cloudiness: f64) -> f64 {
    ghi * (1.0 - reflectivity) * (1.0 - 0.65 * cloudiness.powi(2))
}

/// Atmospheric emissivity (Zhang & Johnson 2016).
pub fn atmospheric_emissivity(air_temp_c: f64, cloudiness: f64) -> f64 {
    let t_air_k = air_temp_c + KELVIN_OFFSET;
    0.937e-5 * (1.0 + 0.17 * cloudiness.powi(2)) * t_air_k.powi(2)
}

/// Downwelling longwave from the atmosphere.
pub fn longwave_down(air_temp_c: f64, cloudiness: f64) -> f64 {
    let t_air_k = air_temp_c + KELVIN_OFFSET;
    atmospheric_emissivity(air_temp_c, cloudiness) * STEFAN_BOLTZMANN * t_air_k.powi(4)
}

/// Longwave emitted by the water surface.
pub fn longwave_up(water_temp_c: f64) -> f64 {
    let t_water_k = water_temp_c + KELVIN_OFFSET;
    WATER_EMISSIVITY * STEFAN_BOLTZMANN * t_water_k.powi(4)
}

// ---------------------------------------------------------------------------
// Turbulent fluxes
// ---------------------------------------------------------------------------

impl WindFunction {
    /// Transfer coefficient for wind speed `u` (m/s).
    pub fn evaluate(&self, u: f64) -> f64 {
        self.scale * (self.a + self.b * u.powf(self.c))
    }
}

/// Latent heat of vaporization (J/kg) at water temperature (°C).
pub fn latent_heat_of_vaporization(water_temp_c: f64) -> f64 {
    2.5e6 - 2386.0 * water_temp_c
}

/// Saturation vapor pressure (mb) at the water temperature, by Horner
/// evaluation of the sixth-order polynomial in kelvin.
pub fn saturation_vapor_pressure(water_temp_c: f64) -> f64 {
    let t = water_temp_c + KELVIN_OFFSET;
    SATURATION_COEFFICIENTS
        .iter()
        .rev()
        .fold(0.0, |acc, &c| acc * t + c)
}

/// Vapor pressure (mb) from dewpoint (°C), Tetens form.
pub fn dewpoint_vapor_pressure(dewpoint_c: f64) -> f64 {
    6.11 * 10f64.powf(7.5 * dewpoint_c / (237.3 + dewpoint_c))
}

/// Actual vapor pressure `e_a` (mb) by the chosen strategy.
pub fn actual_vapor_pressure(
    method: VaporPressureMethod,
    relative_humidity: f64,
    dewpoint_c: f64,
    water_temp_c: f64,
) -> f64 {
    match method {
        VaporPressureMethod::RelativeHumidity => {
            relative_humidity / 100.0 * saturation_vapor_pressure(water_temp_c)
        }
        VaporPressureMethod::Dewpoint => dewpoint_vapor_pressure(dewpoint_c),
    }
}

/// Evaporative heat loss.
///
/// `pressure_mb` is air pressure, `vapor_pressure_mb` is `e_a`, `f_u` the
/// wind function value.
pub fn latent_heat(pressure_mb: f64, water_temp_c: f64, vapor_pressure_mb: f64, f_u: f64) -> f64 {
    let es = saturation_vapor_pressure(water_temp_c);
    VAPOR_MASS_RATIO / pressure_mb
        * latent_heat_of_vaporization(water_temp_c)
        * WATER_DENSITY
        * (es - vapor_pressure_mb)
        * f_u
}

/// Convective heat exchange; positive when the air is warmer than the water.
pub fn sensible_heat(air_temp_c: f64, water_temp_c: f64, f_u: f64) -> f64 {
    AIR_SPECIFIC_HEAT * WATER_DENSITY * (air_temp_c - water_temp_c) * f_u
}

/// `q_sw + q_atm − q_b + q_h − q_l`
pub fn net_flux(q_sw: f64, q_atm: f64, q_b: f64, q_h: f64, q_l: f64) -> f64 {
    q_sw + q_atm - q_b + q_h - q_l
}

// ---------------------------------------------------------------------------
// Series evaluation
// ---------------------------------------------------------------------------

/// Evaluate the five flux terms for every row of `table`.
///
/// Irradiance is requested from `clear_sky` once, for all timestamps. A
/// provider failure, or a response of the wrong length, aborts the
/// computation; missing observations only blank their own timestep.
pub fn compute_fluxes(
    table: &NormalizedTable,
    site: &SiteParameters,
    params: &FluxParameters,
    clear_sky: &dyn ClearSkyProvider,
) -> Result<FluxSeries> {
    if table.is_empty() {
        return Ok(FluxSeries::default());
    }

    let timestamps = table.timestamps();
    let station = table.station_id.as_deref();

    let ghi = clear_sky
        .clear_sky_ghi(site.latitude, site.longitude, site.elevation_m, &timestamps)
        .inspect_err(|e| logging::log_service_failure(DataSource::Solar, station, "clear-sky irradiance", e))?;

    if ghi.len() != timestamps.len() {
        return Err(FluxError::external(
            "clear-sky",
            format!("returned {} values for {} timestamps", ghi.len(), timestamps.len()),
        ));
    }

    let q_b = longwave_up(site.water_temp_c);
    let mut series = FluxSeries {
        timestamps,
        shortwave: Vec::with_capacity(table.len()),
        longwave_down: Vec::with_capacity(table.len()),
        longwave_up: vec![q_b; table.len()],
        sensible_heat: Vec::with_capacity(table.len()),
        latent_heat: Vec::with_capacity(table.len()),
    };

    for (row, &g) in table.rows.iter().zip(&ghi) {
        let f_u = params.wind_function.evaluate(row.wind_speed_ms);
        let e_a = actual_vapor_pressure(
            params.vapor_pressure,
            row.relative_humidity,
            row.dewpoint_c,
            site.water_temp_c,
        );

        series.shortwave.push(shortwave(g, params.shortwave_reflectivity, row.cloudiness));
        series.longwave_down.push(longwave_down(row.air_temp_c, row.cloudiness));
        series.sensible_heat.push(sensible_heat(row.air_temp_c, site.water_temp_c, f_u));
        series.latent_heat.push(latent_heat(row.pressure_mb, site.water_temp_c, e_a, f_u));
    }

    logging::debug(
        DataSource::Engine,
        station,
        &format!("computed fluxes for {} timesteps (q_b = {:.2} W/m²)", series.len(), q_b),
    );

    Ok(series)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
