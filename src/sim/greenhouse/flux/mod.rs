//! Instantaneous exchange rates between the greenhouse compartments.
//!
//! Every flux is a pure function of the state, the parameters, the actuator
//! positions and the outdoor conditions. Fluxes are named `<kind>_<from>_<to>`
//! and are positive in the direction from `from` to `to`:
//!
//! - `r_*`: radiation in W/m^2
//! - `h_*`: sensible heat in W/m^2
//! - `l_*`: latent heat in W/m^2
//! - `f_*`: air flow in m^3/(m^2*s)
//! - `mv_*`: vapor in kg/(m^2*s)
//! - `mc_*`: CO2 in mg/(m^2*s) or carbohydrates in mg CH2O/(m^2*s)
//!
//! All rates are per m^2 of greenhouse floor.

pub mod convection;
pub mod crop;
pub mod exchange;
pub mod radiation;
pub mod vapor;
pub mod ventilation;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::control::ActuatorPosition;
use super::params::{DerivedParameters, ParameterSet};
use super::record::named_record;
use super::state::State;
use super::weather::WeatherSample;
use crate::error::ComputationError;

pub use convection::HeatFluxes;
pub use crop::CropFluxes;
pub use radiation::{CoverOptics, RadiationFluxes};
pub use vapor::VaporFluxes;
pub use ventilation::VentilationFluxes;

named_record! {
    /// CO2 balance terms in mg/(m^2*s).
    #[derive(Default)]
    pub struct Co2Fluxes {
        /// Injection from the external CO2 source.
        mc_ext_air,
        /// Main to top compartment through the screen.
        mc_air_top,
        /// Top compartment to outside through the roof.
        mc_top_out,
        /// Main compartment to outside by leakage.
        mc_air_out,
        /// Net uptake by the canopy.
        mc_air_can,
    }
}

/// Every exchange term of one evaluation of the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FluxSet {
    pub radiation: RadiationFluxes,
    pub heat: HeatFluxes,
    pub ventilation: VentilationFluxes,
    pub vapor: VaporFluxes,
    pub co2: Co2Fluxes,
    pub crop: CropFluxes,
}

impl FluxSet {
    /// All fields as `group.name`, in export order.
    pub fn field_names() -> Vec<String> {
        let mut names = Vec::new();
        let groups: [(&str, &[&str]); 6] = [
            ("radiation", RadiationFluxes::FIELD_NAMES),
            ("heat", HeatFluxes::FIELD_NAMES),
            ("ventilation", VentilationFluxes::FIELD_NAMES),
            ("vapor", VaporFluxes::FIELD_NAMES),
            ("co2", Co2Fluxes::FIELD_NAMES),
            ("crop", CropFluxes::FIELD_NAMES),
        ];
        for (group, fields) in groups {
            names.extend(fields.iter().map(|f| format!("{group}.{f}")));
        }
        names
    }

    /// Values in the order of [`FluxSet::field_names`].
    pub fn values(&self) -> Vec<f64> {
        let mut v = self.radiation.values();
        v.extend(self.heat.values());
        v.extend(self.ventilation.values());
        v.extend(self.vapor.values());
        v.extend(self.co2.values());
        v.extend(self.crop.values());
        v
    }

    pub fn first_non_finite(&self) -> Option<(String, f64)> {
        Self::field_names()
            .into_iter()
            .zip(self.values())
            .find(|(_, v)| !v.is_finite())
    }

    /// Net heat entering the greenhouse (all heat nodes together) in W/m^2.
    ///
    /// Exchange between internal nodes cancels; what remains is solar and
    /// electrical input, boiler heat, losses to sky, outside air and deep
    /// soil, and latent heat leaving or entering the sensible pool by
    /// transpiration and condensation.
    pub fn external_heat_input(&self) -> f64 {
        let r = &self.radiation;
        let h = &self.heat;
        let l = &self.vapor;
        let solar = r.r_glob_sun_air
            + r.r_par_sun_can
            + r.r_nir_sun_can
            + r.r_par_sun_flr
            + r.r_nir_sun_flr
            + r.r_glob_sun_cov_e;
        let supplied = h.h_boil_pipe + h.q_lamp_in - h.h_lamp_cool;
        let sky = r.r_can_sky
            + r.r_pipe_sky
            + r.r_flr_sky
            + r.r_th_scr_sky
            + r.r_cov_e_sky
            + r.r_lamp_sky;
        let outside = h.h_cov_e_out + h.h_air_out + h.h_top_out + h.h_so5_so_out;
        let latent = l.l_air_th_scr + l.l_top_cov_in - l.l_can_air;
        solar + supplied - sky - outside + latent
    }

    /// Net CO2 entering the greenhouse air (both compartments) in mg/(m^2*s).
    pub fn net_co2_input(&self) -> f64 {
        let c = &self.co2;
        c.mc_ext_air - c.mc_air_can - c.mc_air_out - c.mc_top_out
    }
}

/// Sanitized inputs shared by all flux groups.
pub(crate) struct FluxInputs<'a> {
    pub p: &'a ParameterSet,
    pub d: &'a DerivedParameters,
    pub x: State,
    pub u: ActuatorPosition,
    pub w: WeatherSample,
    /// Leaf area index.
    pub lai: f64,
    /// Electrical lamp input in W/m^2.
    pub q_lamp_in: f64,
}

impl<'a> FluxInputs<'a> {
    fn new(
        p: &'a ParameterSet,
        d: &'a DerivedParameters,
        state: &State,
        u: &ActuatorPosition,
        w: &WeatherSample,
    ) -> Self {
        let mut x = *state;
        for v in [
            &mut x.co2_air,
            &mut x.co2_top,
            &mut x.vp_air,
            &mut x.vp_top,
            &mut x.c_buf,
            &mut x.c_leaf,
            &mut x.c_stem,
            &mut x.c_fruit,
        ] {
            *v = v.max(0.0);
        }
        let mut w = *w;
        w.i_glob = w.i_glob.max(0.0);
        w.vp_out = w.vp_out.max(0.0);
        w.co2_out = w.co2_out.max(0.0);
        w.wind = w.wind.max(0.0);
        let u = u.clamped();
        Self {
            p,
            d,
            lai: p.crop.specific_leaf_area * x.c_leaf,
            q_lamp_in: p.lamps.max_intensity * u.lamp,
            x,
            u,
            w,
        }
    }
}

/// Evaluates the complete [`FluxSet`] for a fixed parameter set.
#[derive(Debug, Clone)]
pub struct FluxModel {
    params: Arc<ParameterSet>,
    derived: DerivedParameters,
}

impl FluxModel {
    pub fn new(params: Arc<ParameterSet>) -> Self {
        let derived = params.derived();
        Self { params, derived }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn derived(&self) -> &DerivedParameters {
        &self.derived
    }

    pub fn compute(
        &self,
        state: &State,
        actuators: &ActuatorPosition,
        weather: &WeatherSample,
    ) -> Result<FluxSet, ComputationError> {
        check_finite("state", state.first_non_finite())?;
        check_finite("actuators", actuators.first_non_finite())?;
        check_finite("weather", weather.first_non_finite())?;

        let inputs = FluxInputs::new(&self.params, &self.derived, state, actuators, weather);
        let radiation = radiation::compute(&inputs);
        let ventilation = ventilation::compute(&inputs);
        let heat = convection::compute(&inputs, &ventilation);
        let vapor = vapor::compute(&inputs, &radiation, &ventilation);
        let crop = crop::compute(&inputs, &radiation);
        let co2 = co2_balance(&inputs, &ventilation, &crop);

        let flux = FluxSet {
            radiation,
            heat,
            ventilation,
            vapor,
            co2,
            crop,
        };
        if let Some((term, value)) = flux.first_non_finite() {
            return Err(ComputationError::new(term, value));
        }
        Ok(flux)
    }
}

fn check_finite(group: &str, bad: Option<(&'static str, f64)>) -> Result<(), ComputationError> {
    match bad {
        Some((name, value)) => Err(ComputationError::new(format!("{group}.{name}"), value)),
        None => Ok(()),
    }
}

fn co2_balance(inp: &FluxInputs, vent: &VentilationFluxes, crop: &CropFluxes) -> Co2Fluxes {
    let x = &inp.x;
    let c = &inp.p.constants;
    let organ_respiration = crop.mc_leaf_air + crop.mc_stem_air + crop.mc_fruit_air;
    Co2Fluxes {
        mc_ext_air: inp.u.ext_co2 * inp.p.heating.co2_injection_capacity,
        mc_air_top: exchange::air_co2_flux(vent.f_th_scr, x.co2_air, x.co2_top),
        mc_top_out: exchange::air_co2_flux(vent.f_vent_roof, x.co2_top, inp.w.co2_out),
        mc_air_out: exchange::air_co2_flux(vent.f_vent_side, x.co2_air, inp.w.co2_out),
        mc_air_can: c.molar_mass_co2 / c.molar_mass_ch2o
            * (crop.mc_air_buf - crop.mc_buf_air - organ_respiration),
    }
}
