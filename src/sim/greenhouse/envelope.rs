//! Per-step handshake with an external building-envelope solver.
//!
//! Each step the greenhouse exports its boundary conditions as an
//! [`EnvelopeBoundary`] and may receive [`EnvelopeFluxes`] that replace the
//! internally computed cover exchange terms for that step.

use serde::{Deserialize, Serialize};

use super::flux::FluxSet;
use super::psychro::humidity_ratio_to_vapor_pressure;
use super::record::named_record;
use super::state::State;
use super::weather::WeatherSample;
use crate::error::CollaboratorError;

named_record! {
    /// Indoor and outdoor conditions at the cover, exported once per step.
    #[derive(Default)]
    pub struct EnvelopeBoundary {
        /// Simulation time in s.
        time_s,
        /// Air below the thermal screen in °C.
        t_air,
        /// Air above the thermal screen in °C.
        t_top,
        /// Inner cover surface in °C.
        t_cov_in,
        /// Outer cover surface in °C.
        t_cov_e,
        /// Vapor pressure of the main compartment in Pa.
        vp_air,
        /// Outdoor air in °C.
        t_out,
        /// Sky in °C.
        t_sky,
        /// Wind speed in m/s.
        wind,
        /// Global radiation in W/m^2.
        i_glob,
    }
}

impl EnvelopeBoundary {
    pub fn new(state: &State, weather: &WeatherSample) -> Self {
        Self {
            time_s: weather.time_s,
            t_air: state.t_air,
            t_top: state.t_top,
            t_cov_in: state.t_cov_in,
            t_cov_e: state.t_cov_e,
            vp_air: state.vp_air,
            t_out: weather.t_out,
            t_sky: weather.t_sky,
            wind: weather.wind,
            i_glob: weather.i_glob,
        }
    }
}

/// Replacement cover exchange terms in W/m^2 floor.
///
/// `None` keeps the internally computed value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeFluxes {
    /// Top compartment to the inner cover surface.
    pub h_top_cov_in: Option<f64>,
    /// Conduction through the cover.
    pub h_cov_in_cov_e: Option<f64>,
    /// Outer cover surface to outdoor air.
    pub h_cov_e_out: Option<f64>,
    /// Outer cover surface to sky.
    pub r_cov_e_sky: Option<f64>,
}

impl EnvelopeFluxes {
    fn named(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("h_top_cov_in", self.h_top_cov_in),
            ("h_cov_in_cov_e", self.h_cov_in_cov_e),
            ("h_cov_e_out", self.h_cov_e_out),
            ("r_cov_e_sky", self.r_cov_e_sky),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.named().iter().all(|(_, v)| v.is_none())
    }

    /// Rejects non-finite replacement values.
    pub fn validate(&self, collaborator: &str) -> Result<(), CollaboratorError> {
        for (name, value) in self.named() {
            if let Some(v) = value
                && !v.is_finite()
            {
                return Err(CollaboratorError::new(
                    collaborator,
                    format!("returned non-finite {name} = {v}"),
                ));
            }
        }
        Ok(())
    }

    /// Writes the provided values into `flux`.
    pub fn apply(&self, flux: &mut FluxSet) {
        if let Some(v) = self.h_top_cov_in {
            flux.heat.h_top_cov_in = v;
        }
        if let Some(v) = self.h_cov_in_cov_e {
            flux.heat.h_cov_in_cov_e = v;
        }
        if let Some(v) = self.h_cov_e_out {
            flux.heat.h_cov_e_out = v;
        }
        if let Some(v) = self.r_cov_e_sky {
            flux.radiation.r_cov_e_sky = v;
        }
    }
}

/// External solver called synchronously once per step.
pub trait EnvelopeCollaborator: Send {
    fn name(&self) -> &str {
        "envelope"
    }

    fn exchange(
        &mut self,
        boundary: &EnvelopeBoundary,
    ) -> Result<EnvelopeFluxes, CollaboratorError>;
}

impl<F> EnvelopeCollaborator for F
where
    F: FnMut(&EnvelopeBoundary) -> Result<EnvelopeFluxes, CollaboratorError> + Send,
{
    fn exchange(
        &mut self,
        boundary: &EnvelopeBoundary,
    ) -> Result<EnvelopeFluxes, CollaboratorError> {
        self(boundary)
    }
}

/// Zone air as reported by an envelope solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneAirReading {
    /// Dry-bulb temperature in °C.
    pub t_air: f64,
    /// Humidity ratio in kg water per kg dry air.
    pub humidity_ratio: f64,
}

impl ZoneAirReading {
    /// Vapor pressure of the zone air in Pa.
    pub fn vapor_pressure(&self) -> f64 {
        humidity_ratio_to_vapor_pressure(self.humidity_ratio)
    }
}
