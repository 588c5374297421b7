//! Convective and conductive heat exchange, including heat carried by air flows.

use super::exchange::sensible;
use super::{FluxInputs, VentilationFluxes};
use crate::sim::greenhouse::record::named_record;

named_record! {
    /// Sensible heat fluxes and heat sources in W/m^2 floor.
    #[derive(Default)]
    pub struct HeatFluxes {
        /// Electrical input of the lamps.
        q_lamp_in,
        /// Boiler to heating pipes.
        h_boil_pipe,
        /// Heat removed from the lamps by active cooling.
        h_lamp_cool,
        h_can_air,
        h_air_flr,
        h_air_th_scr,
        h_th_scr_top,
        h_top_cov_in,
        /// Conduction through the cover.
        h_cov_in_cov_e,
        h_cov_e_out,
        h_pipe_air,
        h_lamp_air,
        h_flr_so1,
        h_so1_so2,
        h_so2_so3,
        h_so3_so4,
        h_so4_so5,
        /// Layer 5 to the external soil boundary.
        h_so5_so_out,
        /// Leakage from the main compartment.
        h_air_out,
        /// Exchange through the thermal screen.
        h_air_top,
        /// Roof ventilation and leakage.
        h_top_out,
    }
}

pub(crate) fn compute(inp: &FluxInputs, vent: &VentilationFluxes) -> HeatFluxes {
    let p = inp.p;
    let d = inp.d;
    let x = &inp.x;
    let w = &inp.w;
    let g = &p.construction;
    let th = inp.u.th_scr;
    let rho_cp = d.air_density * p.constants.air_specific_heat;

    let d_air_flr = x.t_flr - x.t_air;
    let hec_air_flr = if d_air_flr > 0.0 {
        1.7 * d_air_flr.abs().cbrt()
    } else {
        1.3 * d_air_flr.abs().powf(0.25)
    };
    let hec_air_scr = 1.7 * th * (x.t_air - x.t_th_scr).abs().cbrt();
    let hec_scr_top = 1.7 * th * (x.t_th_scr - x.t_top).abs().cbrt();
    let hec_top_cov =
        g.cover_inside_hec * (x.t_top - x.t_cov_in).abs().cbrt() * d.cover_floor_ratio;
    let hec_cov_out = d.cover_floor_ratio
        * (g.cover_outside_hec_1 + g.cover_outside_hec_2 * w.wind.powf(g.cover_outside_hec_3));
    let h = &p.heating;
    let hec_pipe_air = 1.99
        * std::f64::consts::PI
        * h.pipe_outer_diameter
        * h.pipe_length
        * (x.t_pipe - x.t_air).abs().powf(0.32);

    let so = x.soil();
    let k = d.soil_conductances;

    HeatFluxes {
        q_lamp_in: inp.q_lamp_in,
        h_boil_pipe: inp.u.boil * h.boiler_capacity,
        h_lamp_cool: p.lamps.cooling_fraction * inp.q_lamp_in,
        h_can_air: sensible(2.0 * p.crop.leaf_air_hec * inp.lai, x.t_can, x.t_air),
        h_air_flr: sensible(hec_air_flr, x.t_air, x.t_flr),
        h_air_th_scr: sensible(hec_air_scr, x.t_air, x.t_th_scr),
        h_th_scr_top: sensible(hec_scr_top, x.t_th_scr, x.t_top),
        h_top_cov_in: sensible(hec_top_cov, x.t_top, x.t_cov_in),
        h_cov_in_cov_e: sensible(d.cover_conductance, x.t_cov_in, x.t_cov_e),
        h_cov_e_out: sensible(hec_cov_out, x.t_cov_e, w.t_out),
        h_pipe_air: sensible(hec_pipe_air, x.t_pipe, x.t_air),
        h_lamp_air: sensible(p.lamps.air_hec, x.t_lamp, x.t_air),
        h_flr_so1: sensible(d.floor_soil_conductance, x.t_flr, so[0]),
        h_so1_so2: sensible(k[0], so[0], so[1]),
        h_so2_so3: sensible(k[1], so[1], so[2]),
        h_so3_so4: sensible(k[2], so[2], so[3]),
        h_so4_so5: sensible(k[3], so[3], so[4]),
        h_so5_so_out: sensible(k[4], so[4], w.t_so_out),
        h_air_out: sensible(rho_cp * vent.f_vent_side, x.t_air, w.t_out),
        h_air_top: sensible(rho_cp * vent.f_th_scr, x.t_air, x.t_top),
        h_top_out: sensible(rho_cp * vent.f_vent_roof, x.t_top, w.t_out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::greenhouse::control::ActuatorPosition;
    use crate::sim::greenhouse::flux::ventilation;
    use crate::sim::greenhouse::params::ParameterSet;
    use crate::sim::greenhouse::state::State;
    use crate::sim::greenhouse::weather::WeatherSample;
    use approx::assert_relative_eq;

    fn evaluate(state: &State, u: &ActuatorPosition, w: &WeatherSample) -> HeatFluxes {
        let p = ParameterSet::new();
        let d = p.derived();
        let inp = FluxInputs::new(&p, &d, state, u, w);
        let vent = ventilation::compute(&inp);
        compute(&inp, &vent)
    }

    #[test]
    fn test_boiler_follows_valve() {
        let p = ParameterSet::new();
        let w = WeatherSample::default();
        let state = State::cold_start(&p, &w);
        let u = ActuatorPosition {
            boil: 0.5,
            ..ActuatorPosition::default()
        };
        let h = evaluate(&state, &u, &w);
        assert_relative_eq!(h.h_boil_pipe, 65.0);
        assert_eq!(h.q_lamp_in, 0.0);
    }

    #[test]
    fn test_heat_flows_down_the_gradient() {
        let p = ParameterSet::new();
        let w = WeatherSample {
            t_out: 0.0,
            wind: 5.0,
            t_so_out: 5.0,
            ..WeatherSample::default()
        };
        let mut state = State::cold_start(&p, &w);
        state.t_pipe = 60.0;
        state.t_cov_e = 8.0;
        state.t_cov_in = 10.0;
        state.t_so5 = 9.0;
        let h = evaluate(&state, &ActuatorPosition::default(), &w);
        assert!(h.h_pipe_air > 0.0);
        assert!(h.h_cov_in_cov_e > 0.0);
        assert!(h.h_cov_e_out > 0.0);
        assert!(h.h_air_out > 0.0);
        assert!(h.h_so5_so_out > 0.0);
        // Canopy starts 4 K above the air
        assert!(h.h_can_air > 0.0);
    }

    #[test]
    fn test_floor_convection_is_asymmetric() {
        let p = ParameterSet::new();
        let w = WeatherSample::default();
        let mut warm_floor = State::cold_start(&p, &w);
        warm_floor.t_flr = warm_floor.t_air + 8.0;
        let mut cold_floor = warm_floor;
        cold_floor.t_flr = cold_floor.t_air - 8.0;
        let u = ActuatorPosition::default();
        let up = evaluate(&warm_floor, &u, &w).h_air_flr;
        let down = evaluate(&cold_floor, &u, &w).h_air_flr;
        assert_relative_eq!(up, -1.7 * 2.0 * 8.0, epsilon = 1e-9);
        assert_relative_eq!(down, 1.3 * 8f64.powf(0.25) * 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_open_screen_has_no_surface_convection() {
        let p = ParameterSet::new();
        let w = WeatherSample::default();
        let mut state = State::cold_start(&p, &w);
        state.t_th_scr = state.t_air - 5.0;
        let h = evaluate(&state, &ActuatorPosition::default(), &w);
        assert_eq!(h.h_air_th_scr, 0.0);
        assert_eq!(h.h_th_scr_top, 0.0);
    }
}
