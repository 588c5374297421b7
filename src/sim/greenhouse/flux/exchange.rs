//! Elementary exchange laws shared by the flux groups.

const KELVIN: f64 = 273.15;
const DENOMINATOR_FLOOR: f64 = 1e-9;

/// Optical properties of a horizontal layer for one waveband.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layer {
    /// Transmission.
    pub tau: f64,
    /// Reflection of radiation arriving from above.
    pub rho_up: f64,
    /// Reflection of radiation arriving from below.
    pub rho_dn: f64,
}

impl Layer {
    pub fn symmetric(tau: f64, rho: f64) -> Self {
        Self {
            tau,
            rho_up: rho,
            rho_dn: rho,
        }
    }

    /// Combines `self` (on top) with `below` into one equivalent layer,
    /// accounting for multiple reflections between them.
    pub fn stack(self, below: Layer) -> Layer {
        let denom = (1.0 - self.rho_dn * below.rho_up).max(DENOMINATOR_FLOOR);
        Layer {
            tau: self.tau * below.tau / denom,
            rho_up: self.rho_up + self.tau * self.tau * below.rho_up / denom,
            rho_dn: below.rho_dn + below.tau * below.tau * self.rho_dn / denom,
        }
    }

    /// Absorption of radiation arriving from above.
    pub fn absorption(&self) -> f64 {
        1.0 - self.tau - self.rho_up
    }
}

/// Net far-infrared exchange from surface 1 to surface 2 in W/m^2.
///
/// `a1` is the radiating area of surface 1 per floor area and `f12` the view
/// factor including transmission of intermediate layers.
pub fn fir(a1: f64, eps1: f64, eps2: f64, f12: f64, t1: f64, t2: f64, sigma: f64) -> f64 {
    a1 * eps1 * eps2 * f12 * sigma * ((t1 + KELVIN).powi(4) - (t2 + KELVIN).powi(4))
}

/// Sensible heat flux from 1 to 2 in W/m^2 for a heat exchange coefficient in W/(m^2*K).
pub fn sensible(hec: f64, t1: f64, t2: f64) -> f64 {
    hec.abs() * (t1 - t2)
}

/// Condensation from air at vapor pressure `vp_air` onto a surface whose
/// saturation vapor pressure is `vp_sat`, in kg/(m^2*s).
///
/// Smoothly switches off when the air is drier than the surface.
pub fn condensation(hec: f64, vp_air: f64, vp_sat: f64) -> f64 {
    if hec == 0.0 {
        return 0.0;
    }
    let exponent = (-0.1 * (vp_air - vp_sat)).clamp(-100.0, 100.0);
    6.4e-9 * hec / (1.0 + exponent.exp()) * (vp_air - vp_sat)
}

/// Vapor flux carried by an air flow `f12` in m^3/(m^2*s) from volume 1 to
/// volume 2, in kg/(m^2*s).
pub fn air_vapor_flux(
    f12: f64,
    vp1: f64,
    vp2: f64,
    t1: f64,
    t2: f64,
    molar_mass_water: f64,
    gas_constant: f64,
) -> f64 {
    molar_mass_water / gas_constant * f12.abs() * (vp1 / (t1 + KELVIN) - vp2 / (t2 + KELVIN))
}

/// CO2 flux carried by an air flow `f12` from volume 1 to volume 2, in mg/(m^2*s).
pub fn air_co2_flux(f12: f64, c1: f64, c2: f64) -> f64 {
    f12.abs() * (c1 - c2)
}

/// Harvest rate that rises smoothly to `max_rate` as `value` passes `cut_off`.
///
/// `smooth` is the width of the transition from 1 % to 99 % of `max_rate`.
pub fn smooth_harvest(value: f64, cut_off: f64, smooth: f64, max_rate: f64) -> f64 {
    let exponent = -(value - cut_off) * 2.0 * 100f64.ln() / smooth;
    max_rate / (1.0 + exponent.min(700.0).exp())
}

/// Logistic switch rising from 0 to 1 around `x = 0`.
pub fn logistic(slope: f64, x: f64) -> f64 {
    1.0 / (1.0 + (-slope * x).clamp(-700.0, 700.0).exp())
}
