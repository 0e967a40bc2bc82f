//! Water-surface heat flux service.
//!
//! Computes the surface energy balance of a water body from ASOS station
//! observations: net shortwave, downwelling and upwelling longwave,
//! sensible and latent heat, and their net flux.

pub mod config;
pub mod energy;
pub mod flux;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod solar;
