//! Air exchange through roof vents, leakage and the thermal screen.

use super::FluxInputs;
use crate::sim::greenhouse::record::named_record;

const KELVIN: f64 = 273.15;

named_record! {
    /// Air flows in m^3/(m^2*s).
    #[derive(Default)]
    pub struct VentilationFluxes {
        /// Top compartment to outside (vents and roof leakage).
        f_vent_roof,
        /// Main compartment to outside (wall leakage).
        f_vent_side,
        /// Total leakage.
        f_leakage,
        /// Through the thermal screen.
        f_th_scr,
    }
}

/// Air density at temperature `t` in kg/m^3.
fn density(t: f64, molar_mass_air: f64, pressure: f64, gas_constant: f64) -> f64 {
    molar_mass_air * pressure / ((t + KELVIN) * gas_constant)
}

pub(crate) fn compute(inp: &FluxInputs) -> VentilationFluxes {
    let c = &inp.p.constants;
    let g = &inp.p.construction;
    let x = &inp.x;
    let w = &inp.w;
    let th = inp.u.th_scr;

    // Buoyancy and wind driven flow through the roof openings
    let buoyancy = c.gravity * g.vent_height * (x.t_air - w.t_out)
        / (2.0 * (0.5 * x.t_air + 0.5 * w.t_out + KELVIN));
    let wind = g.wind_pressure_coefficient * w.wind * w.wind;
    let f_vent_roof_open = inp.u.roof * g.roof_vent_area * g.discharge_coefficient
        / (2.0 * g.floor_area)
        * (buoyancy + wind).abs().sqrt();

    let f_leakage = g.leakage_coefficient * w.wind.max(g.min_leakage_wind);
    let f_vent_roof =
        g.insect_screen_factor * f_vent_roof_open + g.leakage_top_fraction * f_leakage;
    let f_vent_side = (1.0 - g.leakage_top_fraction) * f_leakage;

    let rho_air = density(x.t_air, c.molar_mass_air, inp.d.pressure, c.gas_constant);
    let rho_top = density(x.t_top, c.molar_mass_air, inp.d.pressure, c.gas_constant);
    let rho_mean = 0.5 * (rho_air + rho_top);
    let f_th_scr = th * inp.p.screen.permeability * (x.t_air - x.t_top).abs().powf(0.66)
        + (1.0 - th) / rho_mean
            * (0.5 * rho_mean * (1.0 - th) * c.gravity * (rho_air - rho_top).abs()).sqrt();

    VentilationFluxes {
        f_vent_roof,
        f_vent_side,
        f_leakage,
        f_th_scr,
    }
}
