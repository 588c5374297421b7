//! Explicit forward-Euler integration of the greenhouse state.
//!
//! Every state component changes at the rate given by its net flux divided
//! by its capacity. Rates depend on the [`FluxSet`] only, so an all-zero flux
//! set leaves the state untouched.

use serde::Serialize;

use super::flux::FluxSet;
use super::params::{DerivedParameters, ParameterSet};
use super::state::State;

const KELVIN: f64 = 273.15;
/// Leaf area index below which the canopy heat capacity stops shrinking.
const MIN_CAPACITY_LAI: f64 = 0.01;
/// Share of the conservative stability estimate used as the sub-step bound.
const STABILITY_SAFETY: f64 = 0.5;
/// Nominal conditions at which conductances are linearized for the bound.
const NOMINAL_DELTA_T: f64 = 10.0;
const NOMINAL_WIND: f64 = 10.0;
const NOMINAL_TEMPERATURE: f64 = 20.0;

/// Why a component was clamped after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampKind {
    BelowAbsoluteZero,
    Negative,
}

/// Record of a non-physical value that the integrator clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClampFlag {
    pub component: &'static str,
    /// Value before clamping.
    pub value: f64,
    pub kind: ClampKind,
}

/// Capacity of every state component in the layout of [`State`].
///
/// Heat nodes in J/(K*m^2), vapor in kg/(m*J) (so that rates come out in
/// Pa/s), CO2 in m. Components integrated directly (crop pools, temperature
/// memory) have capacity 1.
pub fn capacities(params: &ParameterSet, derived: &DerivedParameters, state: &State) -> State {
    let c = &params.constants;
    let g = &params.construction;
    let lai = state.lai(params).max(MIN_CAPACITY_LAI);
    let vapor = |height: f64, t: f64| {
        c.molar_mass_water * height / (c.gas_constant * (t + KELVIN).max(1.0))
    };
    State {
        co2_air: derived.cap_co2_air,
        co2_top: derived.cap_co2_top,
        t_air: derived.cap_air,
        t_top: derived.cap_top,
        t_can: params.crop.leaf_heat_capacity * lai,
        t_cov_in: derived.cap_cov_in,
        t_cov_e: derived.cap_cov_e,
        t_th_scr: derived.cap_th_scr,
        t_flr: derived.cap_flr,
        t_pipe: derived.cap_pipe,
        t_so1: derived.cap_soil[0],
        t_so2: derived.cap_soil[1],
        t_so3: derived.cap_soil[2],
        t_so4: derived.cap_soil[3],
        t_so5: derived.cap_soil[4],
        vp_air: vapor(g.air_height, state.t_air),
        vp_top: vapor(g.greenhouse_height - g.air_height, state.t_top),
        t_lamp: params.lamps.heat_capacity,
        t_can_24: 1.0,
        c_buf: 1.0,
        c_leaf: 1.0,
        c_stem: 1.0,
        c_fruit: 1.0,
        t_can_sum: 1.0,
        harvested_fruit: 1.0,
    }
}

/// Net flux into every state component, before division by its capacity.
pub fn net_fluxes(f: &FluxSet) -> State {
    let r = &f.radiation;
    let h = &f.heat;
    let v = &f.vapor;
    let co2 = &f.co2;
    let cr = &f.crop;
    State {
        co2_air: co2.mc_ext_air - co2.mc_air_can - co2.mc_air_top - co2.mc_air_out,
        co2_top: co2.mc_air_top - co2.mc_top_out,
        t_air: h.h_can_air + h.h_pipe_air + r.r_glob_sun_air - h.h_air_flr - h.h_air_th_scr
            - h.h_air_out
            - h.h_air_top
            + h.h_lamp_air
            + r.r_lamp_air,
        t_top: h.h_th_scr_top + h.h_air_top - h.h_top_cov_in - h.h_top_out,
        t_can: r.r_par_sun_can + r.r_nir_sun_can + r.r_pipe_can - h.h_can_air - v.l_can_air
            - r.r_can_cov_in
            - r.r_can_flr
            - r.r_can_sky
            - r.r_can_th_scr
            + r.r_par_lamp_can
            + r.r_nir_lamp_can
            + r.r_fir_lamp_can,
        t_cov_in: h.h_top_cov_in + v.l_top_cov_in + r.r_can_cov_in + r.r_flr_cov_in
            + r.r_pipe_cov_in
            + r.r_th_scr_cov_in
            - h.h_cov_in_cov_e
            + r.r_lamp_cov_in,
        t_cov_e: r.r_glob_sun_cov_e + h.h_cov_in_cov_e - h.h_cov_e_out - r.r_cov_e_sky,
        t_th_scr: h.h_air_th_scr + v.l_air_th_scr + r.r_can_th_scr + r.r_flr_th_scr
            + r.r_pipe_th_scr
            - h.h_th_scr_top
            - r.r_th_scr_cov_in
            - r.r_th_scr_sky
            + r.r_lamp_th_scr,
        t_flr: h.h_air_flr + r.r_par_sun_flr + r.r_nir_sun_flr + r.r_can_flr + r.r_pipe_flr
            - h.h_flr_so1
            - r.r_flr_cov_in
            - r.r_flr_sky
            - r.r_flr_th_scr
            + r.r_par_lamp_flr
            + r.r_nir_lamp_flr
            + r.r_fir_lamp_flr,
        t_pipe: h.h_boil_pipe - r.r_pipe_sky - r.r_pipe_cov_in - r.r_pipe_can - r.r_pipe_flr
            - r.r_pipe_th_scr
            - h.h_pipe_air
            + r.r_lamp_pipe,
        t_so1: h.h_flr_so1 - h.h_so1_so2,
        t_so2: h.h_so1_so2 - h.h_so2_so3,
        t_so3: h.h_so2_so3 - h.h_so3_so4,
        t_so4: h.h_so3_so4 - h.h_so4_so5,
        t_so5: h.h_so4_so5 - h.h_so5_so_out,
        vp_air: v.mv_can_air - v.mv_air_th_scr - v.mv_air_top - v.mv_air_out,
        vp_top: v.mv_air_top - v.mv_top_cov_in - v.mv_top_out,
        t_lamp: h.q_lamp_in
            - h.h_lamp_air
            - r.r_lamp_sky
            - r.r_lamp_cov_in
            - r.r_lamp_th_scr
            - r.r_lamp_pipe
            - r.r_lamp_air
            - r.r_par_lamp_flr
            - r.r_nir_lamp_flr
            - r.r_fir_lamp_flr
            - r.r_par_lamp_can
            - r.r_nir_lamp_can
            - r.r_fir_lamp_can
            - h.h_lamp_cool,
        t_can_24: cr.t_can_24_rate,
        c_buf: cr.mc_air_buf - cr.mc_buf_fruit - cr.mc_buf_leaf - cr.mc_buf_stem - cr.mc_buf_air,
        c_leaf: cr.mc_buf_leaf - cr.mc_leaf_air - cr.mc_leaf_har,
        c_stem: cr.mc_buf_stem - cr.mc_stem_air,
        c_fruit: cr.mc_buf_fruit - cr.mc_fruit_air - cr.mc_fruit_har,
        t_can_sum: cr.t_can_sum_rate,
        harvested_fruit: cr.mc_fruit_har,
    }
}

/// Time derivative of every state component.
pub fn derivatives(flux: &FluxSet, capacities: &State) -> State {
    net_fluxes(flux).zip_with(capacities, |net, cap| net / cap)
}

/// Heat stored in all thermal nodes relative to 0 °C, in J/m^2.
pub fn stored_heat(capacities: &State, state: &State) -> f64 {
    let c = capacities;
    let x = state;
    c.t_air * x.t_air
        + c.t_top * x.t_top
        + c.t_can * x.t_can
        + c.t_cov_in * x.t_cov_in
        + c.t_cov_e * x.t_cov_e
        + c.t_th_scr * x.t_th_scr
        + c.t_flr * x.t_flr
        + c.t_pipe * x.t_pipe
        + c.t_so1 * x.t_so1
        + c.t_so2 * x.t_so2
        + c.t_so3 * x.t_so3
        + c.t_so4 * x.t_so4
        + c.t_so5 * x.t_so5
        + c.t_lamp * x.t_lamp
}

/// CO2 held in both air compartments in mg/m^2 floor.
pub fn stored_co2(capacities: &State, state: &State) -> f64 {
    capacities.co2_air * state.co2_air + capacities.co2_top * state.co2_top
}

/// Advances `state` by `dt_s` seconds and clamps non-physical results.
pub fn advance(
    state: &State,
    flux: &FluxSet,
    capacities: &State,
    dt_s: f64,
) -> (State, Vec<ClampFlag>) {
    let rates = derivatives(flux, capacities);
    let mut next = state.zip_with(&rates, |x, rate| x + dt_s * rate);
    let flags = clamp(&mut next);
    (next, flags)
}

fn clamp(x: &mut State) -> Vec<ClampFlag> {
    let mut flags = Vec::new();
    let temperatures: [(&'static str, &mut f64); 14] = [
        ("t_air", &mut x.t_air),
        ("t_top", &mut x.t_top),
        ("t_can", &mut x.t_can),
        ("t_cov_in", &mut x.t_cov_in),
        ("t_cov_e", &mut x.t_cov_e),
        ("t_th_scr", &mut x.t_th_scr),
        ("t_flr", &mut x.t_flr),
        ("t_pipe", &mut x.t_pipe),
        ("t_so1", &mut x.t_so1),
        ("t_so2", &mut x.t_so2),
        ("t_so3", &mut x.t_so3),
        ("t_so4", &mut x.t_so4),
        ("t_so5", &mut x.t_so5),
        ("t_lamp", &mut x.t_lamp),
    ];
    for (component, t) in temperatures {
        if *t < -KELVIN {
            flags.push(ClampFlag {
                component,
                value: *t,
                kind: ClampKind::BelowAbsoluteZero,
            });
            *t = -KELVIN;
        }
    }
    let non_negative: [(&'static str, &mut f64); 9] = [
        ("co2_air", &mut x.co2_air),
        ("co2_top", &mut x.co2_top),
        ("vp_air", &mut x.vp_air),
        ("vp_top", &mut x.vp_top),
        ("c_buf", &mut x.c_buf),
        ("c_leaf", &mut x.c_leaf),
        ("c_stem", &mut x.c_stem),
        ("c_fruit", &mut x.c_fruit),
        ("harvested_fruit", &mut x.harvested_fruit),
    ];
    for (component, v) in non_negative {
        if *v < 0.0 {
            flags.push(ClampFlag {
                component,
                value: *v,
                kind: ClampKind::Negative,
            });
            *v = 0.0;
        }
    }
    flags
}

/// Largest sub-step in s for which forward Euler stays stable.
///
/// Each node's conductances to its neighbours are linearized at nominal
/// conditions (10 K differences, 10 m/s wind, vents and screen fully open
/// where that is the stiffer case) and summed. The smallest ratio of capacity
/// to total conductance bounds the step, scaled by a safety factor.
pub fn stable_step_s(params: &ParameterSet) -> f64 {
    let d = params.derived();
    let c = &params.constants;
    let g = &params.construction;
    let cr = &params.crop;
    let lamps = &params.lamps;
    let dt = NOMINAL_DELTA_T;
    let t_k = NOMINAL_TEMPERATURE + KELVIN;

    let fir = 4.0 * c.stefan_boltzmann * (t_k + dt).powi(3);
    let rho_cp = d.air_density * c.air_specific_heat;

    // Air flows at nominal conditions
    let buoyancy = c.gravity * g.vent_height * dt / (2.0 * t_k);
    let wind = g.wind_pressure_coefficient * NOMINAL_WIND * NOMINAL_WIND;
    let f_roof = g.roof_vent_area * g.discharge_coefficient / (2.0 * g.floor_area)
        * (buoyancy + wind).sqrt()
        + g.leakage_coefficient * NOMINAL_WIND;
    let rho = d.air_density;
    let delta_rho = rho * dt / t_k;
    let f_scr = (0.5 * rho * c.gravity * delta_rho).sqrt() / rho;
    let f_side = g.leakage_coefficient * NOMINAL_WIND;

    let hec_cov_in = g.cover_inside_hec * dt.cbrt() * d.cover_floor_ratio;
    let hec_cov_out = d.cover_floor_ratio
        * (g.cover_outside_hec_1
            + g.cover_outside_hec_2 * NOMINAL_WIND.powf(g.cover_outside_hec_3));
    let hec_scr = 1.7 * dt.cbrt();
    let hec_pipe = 1.99
        * std::f64::consts::PI
        * params.heating.pipe_outer_diameter
        * params.heating.pipe_length
        * dt.powf(0.32);
    let hec_flr = 1.7 * dt.cbrt();
    let h_top = g.greenhouse_height - g.air_height;

    let rates = [
        (d.cover_conductance + hec_cov_in + 4.0 * fir) / d.cap_cov_in,
        (d.cover_conductance + hec_cov_out + fir) / d.cap_cov_e,
        (2.0 * hec_scr + 4.0 * fir) / d.cap_th_scr,
        (rho_cp * (f_roof + f_scr) + hec_cov_in + hec_scr) / d.cap_top,
        (f_roof + f_scr) / h_top,
        (f_scr + f_side) / g.air_height,
        (rho_cp * (f_scr + f_side)
            + 2.0 * cr.leaf_air_hec * cr.lai_max
            + hec_pipe
            + hec_flr
            + hec_scr
            + lamps.air_hec)
            / d.cap_air,
        (2.0 * cr.leaf_air_hec + 4.0 * cr.k_fir * fir) / cr.leaf_heat_capacity,
        (lamps.air_hec + 4.0 * lamps.area_fraction * fir) / lamps.heat_capacity,
        (hec_pipe + 4.0 * d.pipe_area * fir) / d.cap_pipe,
        (hec_flr + d.floor_soil_conductance + 4.0 * fir) / d.cap_flr,
        (d.floor_soil_conductance + d.soil_conductances[0]) / d.cap_soil[0],
    ];
    let stiffest = rates.into_iter().fold(0.0_f64, f64::max);
    STABILITY_SAFETY / stiffest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::greenhouse::control::ActuatorPosition;
    use crate::sim::greenhouse::flux::FluxModel;
    use crate::sim::greenhouse::params::LampType;
    use crate::sim::greenhouse::weather::WeatherSample;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn weather(i_glob: f64) -> WeatherSample {
        WeatherSample {
            i_glob,
            t_out: 5.0,
            vp_out: 700.0,
            co2_out: 740.0,
            wind: 4.0,
            t_sky: -10.0,
            t_so_out: 8.0,
            ..WeatherSample::default()
        }
    }

    #[test]
    fn test_zero_flux_leaves_state_unchanged() {
        let p = ParameterSet::new();
        let state = State::mature(&p, &weather(0.0));
        let caps = capacities(&p, &p.derived(), &state);
        let (next, flags) = advance(&state, &FluxSet::default(), &caps, 300.0);
        assert_eq!(next, state);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_stable_step_is_sub_second_to_seconds() {
        let dt = stable_step_s(&ParameterSet::new());
        assert!(dt > 0.05 && dt < 5.0, "{dt}");
        let dt_led = stable_step_s(&ParameterSet::new().with_lamps(LampType::Led));
        assert!(dt_led <= dt);
    }

    #[test]
    fn test_negative_pool_is_clamped_and_flagged() {
        let p = ParameterSet::new();
        let mut state = State::cold_start(&p, &weather(0.0));
        state.c_buf = 1.0;
        let caps = capacities(&p, &p.derived(), &state);
        let mut flux = FluxSet::default();
        flux.crop.mc_buf_air = 10.0;
        let (next, flags) = advance(&state, &flux, &caps, 1.0);
        assert_eq!(next.c_buf, 0.0);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].component, "c_buf");
        assert_eq!(flags[0].kind, ClampKind::Negative);
        assert_relative_eq!(flags[0].value, -9.0);
    }

    #[test]
    fn test_absolute_zero_is_a_floor() {
        let p = ParameterSet::new();
        let state = State::cold_start(&p, &weather(0.0));
        let caps = capacities(&p, &p.derived(), &state);
        let mut flux = FluxSet::default();
        flux.radiation.r_cov_e_sky = 1e9;
        let (next, flags) = advance(&state, &flux, &caps, 1.0);
        assert_eq!(next.t_cov_e, -KELVIN);
        assert_eq!(flags[0].kind, ClampKind::BelowAbsoluteZero);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn single_step_conserves_energy_and_co2(
            i_glob in 0.0..800.0f64,
            boil in 0.0..1.0f64,
            roof in 0.0..1.0f64,
            th_scr in 0.0..1.0f64,
            lamp in 0.0..1.0f64,
            ext_co2 in 0.0..1.0f64,
        ) {
            let p = Arc::new(ParameterSet::new().with_lamps(LampType::Hps));
            let model = FluxModel::new(p.clone());
            let w = weather(i_glob);
            let mut state = State::mature(&p, &w);
            state.c_buf = 5e3;
            let u = ActuatorPosition { roof, th_scr, boil, lamp, ext_co2 };
            let flux = model.compute(&state, &u, &w).unwrap();
            let caps = capacities(&p, model.derived(), &state);
            let dt = 0.5;
            let (next, flags) = advance(&state, &flux, &caps, dt);
            prop_assert!(flags.is_empty());

            let heat = stored_heat(&caps, &next) - stored_heat(&caps, &state);
            let expected = dt * flux.external_heat_input();
            prop_assert!(
                (heat - expected).abs() <= 1e-6 * (1.0 + expected.abs()),
                "{heat} vs {expected}"
            );

            let co2 = stored_co2(&caps, &next) - stored_co2(&caps, &state);
            let expected = dt * flux.net_co2_input();
            prop_assert!(
                (co2 - expected).abs() <= 1e-6 * (1.0 + expected.abs()),
                "{co2} vs {expected}"
            );
        }
    }
}
