//! Transpiration, condensation, vapor transport by air flows and the latent heat they carry.

use super::exchange::{air_vapor_flux, condensation};
use super::{FluxInputs, RadiationFluxes, VentilationFluxes};
use crate::sim::greenhouse::psychro::saturation_vapor_pressure;
use crate::sim::greenhouse::record::named_record;

named_record! {
    /// Vapor fluxes in kg/(m^2*s) and latent heat fluxes in W/m^2.
    #[derive(Default)]
    pub struct VaporFluxes {
        /// Canopy transpiration.
        mv_can_air,
        /// Condensation on the thermal screen.
        mv_air_th_scr,
        /// Condensation on the inside of the cover.
        mv_top_cov_in,
        mv_air_top,
        mv_top_out,
        mv_air_out,
        l_can_air,
        l_air_th_scr,
        l_top_cov_in,
    }
}

/// Stomatal resistance of the canopy in s/m.
///
/// `r_can` is the global radiation above the canopy, `co2_air` the CO2
/// concentration in mg/m^3 and `vp_deficit` the leaf-to-air vapor pressure
/// difference in Pa.
pub(crate) fn stomatal_resistance(
    inp: &FluxInputs,
    r_can: f64,
    co2_air: f64,
    vp_deficit: f64,
) -> f64 {
    let cr = &inp.p.crop;
    let switch = cr.stomata_switch_slope * (r_can - cr.stomata_radiation_setpoint);
    let day = 1.0 / (1.0 + switch.clamp(-700.0, 700.0).exp());
    let c_evap_3 = cr.c_evap_3_night * (1.0 - day) + cr.c_evap_3_day * day;
    let c_evap_4 = cr.c_evap_4_night * (1.0 - day) + cr.c_evap_4_day * day;

    let rf_radiation = (r_can + cr.c_evap_1) / (r_can + cr.c_evap_2);
    let co2_ppm = inp.p.constants.co2_mg_to_ppm * co2_air;
    let rf_co2 = (1.0 + c_evap_3 * (co2_ppm - 200.0).powi(2)).min(1.5);
    let rf_vp = (1.0 + c_evap_4 * vp_deficit.powi(2)).min(5.8);
    cr.min_stomatal_resistance * rf_radiation * rf_co2 * rf_vp
}

pub(crate) fn compute(
    inp: &FluxInputs,
    rad: &RadiationFluxes,
    vent: &VentilationFluxes,
) -> VaporFluxes {
    let p = inp.p;
    let c = &p.constants;
    let x = &inp.x;
    let w = &inp.w;
    let th = inp.u.th_scr;

    let vp_can = saturation_vapor_pressure(x.t_can);
    let r_s = stomatal_resistance(inp, rad.r_can, x.co2_air, vp_can - x.vp_air);
    let vec_can_air = 2.0 * inp.d.air_density * c.air_specific_heat * inp.lai
        / (c.latent_heat * c.psychrometric_constant * (p.crop.boundary_resistance + r_s));
    let mv_can_air = (vp_can - x.vp_air) * vec_can_air;

    let mv_air_th_scr = condensation(
        1.7 * th * (x.t_air - x.t_th_scr).abs().cbrt(),
        x.vp_air,
        saturation_vapor_pressure(x.t_th_scr),
    );
    let mv_top_cov_in = condensation(
        p.construction.cover_inside_hec
            * (x.t_top - x.t_cov_in).abs().cbrt()
            * inp.d.cover_floor_ratio,
        x.vp_top,
        saturation_vapor_pressure(x.t_cov_in),
    );

    let transport = |f: f64, vp1: f64, vp2: f64, t1: f64, t2: f64| {
        air_vapor_flux(f, vp1, vp2, t1, t2, c.molar_mass_water, c.gas_constant)
    };

    VaporFluxes {
        mv_can_air,
        mv_air_th_scr,
        mv_top_cov_in,
        mv_air_top: transport(vent.f_th_scr, x.vp_air, x.vp_top, x.t_air, x.t_top),
        mv_top_out: transport(vent.f_vent_roof, x.vp_top, w.vp_out, x.t_top, w.t_out),
        mv_air_out: transport(vent.f_vent_side, x.vp_air, w.vp_out, x.t_air, w.t_out),
        l_can_air: c.latent_heat * mv_can_air,
        l_air_th_scr: c.latent_heat * mv_air_th_scr,
        l_top_cov_in: c.latent_heat * mv_top_cov_in,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::greenhouse::control::ActuatorPosition;
    use crate::sim::greenhouse::flux::{radiation, ventilation};
    use crate::sim::greenhouse::params::ParameterSet;
    use crate::sim::greenhouse::state::State;
    use crate::sim::greenhouse::weather::WeatherSample;

    fn evaluate(state: &State, u: &ActuatorPosition, w: &WeatherSample) -> VaporFluxes {
        let p = ParameterSet::new();
        let d = p.derived();
        let inp = FluxInputs::new(&p, &d, state, u, w);
        let rad = radiation::compute(&inp);
        let vent = ventilation::compute(&inp);
        compute(&inp, &rad, &vent)
    }

    fn weather(i_glob: f64) -> WeatherSample {
        WeatherSample {
            i_glob,
            t_out: 10.0,
            vp_out: 800.0,
            co2_out: 740.0,
            ..WeatherSample::default()
        }
    }

    #[test]
    fn test_light_opens_stomata() {
        let p = ParameterSet::new();
        let d = p.derived();
        let w = weather(0.0);
        let state = State::mature(&p, &w);
        let inp = FluxInputs::new(&p, &d, &state, &ActuatorPosition::default(), &w);
        let dark = stomatal_resistance(&inp, 0.0, 740.0, 500.0);
        let bright = stomatal_resistance(&inp, 300.0, 740.0, 500.0);
        assert!(bright < dark);
        assert!(bright >= p.crop.min_stomatal_resistance);
    }

    #[test]
    fn test_transpiration_and_latent_heat() {
        let p = ParameterSet::new();
        let w = weather(400.0);
        let state = State::mature(&p, &w);
        let v = evaluate(&state, &ActuatorPosition::default(), &w);
        assert!(v.mv_can_air > 0.0);
        assert!((v.l_can_air - 2.45e6 * v.mv_can_air).abs() < 1e-9);
        // Humid greenhouse air leaks to drier outside air
        assert!(v.mv_air_out > 0.0);
        assert!(v.mv_top_out > 0.0);
    }

    #[test]
    fn test_cold_cover_collects_condensate() {
        let p = ParameterSet::new();
        let w = weather(0.0);
        let mut state = State::mature(&p, &w);
        state.t_cov_in = 5.0;
        let v = evaluate(&state, &ActuatorPosition::default(), &w);
        assert!(v.mv_top_cov_in > 0.0);
        assert!(v.l_top_cov_in > 0.0);
        // Open screen collects nothing
        assert_eq!(v.mv_air_th_scr, 0.0);
    }

    #[test]
    fn test_no_transpiration_without_leaves() {
        let p = ParameterSet::new();
        let w = weather(400.0);
        let mut state = State::mature(&p, &w);
        state.c_leaf = 0.0;
        let v = evaluate(&state, &ActuatorPosition::default(), &w);
        assert_eq!(v.mv_can_air, 0.0);
    }
}
