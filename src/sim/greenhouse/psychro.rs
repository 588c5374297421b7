//! Psychrometric and gas-concentration conversions.
//!
//! Weather files and co-simulation partners report humidity and CO2 in several
//! units; the climate model itself works with vapor pressure [Pa] and CO2
//! density [mg/m^3].

const MOLAR_GAS_CONSTANT: f64 = 8.3144598; // J/(mol*K)
const KELVIN: f64 = 273.15;
const MOLAR_MASS_WATER: f64 = 18.01528e-3; // kg/mol
const MOLAR_MASS_CO2: f64 = 44.01e-3; // kg/mol
const ATMOSPHERIC_PRESSURE: f64 = 101325.0; // Pa
const WATER_AIR_MASS_RATIO: f64 = 0.621945;

/// Saturation vapor pressure over water in Pa for a temperature in °C.
pub fn saturation_vapor_pressure(t: f64) -> f64 {
    610.78 * (17.2694 * t / (t + 238.3)).exp()
}

/// Relative humidity in % of air at `t` °C holding vapor pressure `vp` Pa.
pub fn relative_humidity(t: f64, vp: f64) -> f64 {
    100.0 * vp / saturation_vapor_pressure(t)
}

/// Vapor density in kg/m^3 from temperature in °C and relative humidity in %.
pub fn rh_to_vapor_density(t: f64, rh: f64) -> f64 {
    let vp = rh / 100.0 * saturation_vapor_pressure(t);
    vapor_pressure_to_density(t, vp)
}

/// Vapor density in kg/m^3 of air at `t` °C with vapor pressure `vp` Pa.
pub fn vapor_pressure_to_density(t: f64, vp: f64) -> f64 {
    vp * MOLAR_MASS_WATER / (MOLAR_GAS_CONSTANT * (t + KELVIN))
}

/// Vapor pressure in Pa of air at `t` °C with vapor density `density` kg/m^3.
pub fn vapor_density_to_pressure(t: f64, density: f64) -> f64 {
    density * MOLAR_GAS_CONSTANT * (t + KELVIN) / MOLAR_MASS_WATER
}

/// Vapor pressure in Pa from a humidity ratio in kg water per kg dry air.
///
/// Assumes standard atmospheric pressure.
pub fn humidity_ratio_to_vapor_pressure(ratio: f64) -> f64 {
    ratio / (WATER_AIR_MASS_RATIO + ratio) * ATMOSPHERIC_PRESSURE
}

/// CO2 density in kg/m^3 from a molar concentration in ppm at `t` °C.
pub fn co2_ppm_to_density(t: f64, ppm: f64) -> f64 {
    ATMOSPHERIC_PRESSURE * MOLAR_MASS_CO2 * ppm * 1e-6 / (MOLAR_GAS_CONSTANT * (t + KELVIN))
}

/// CO2 molar concentration in ppm from a density in kg/m^3 at `t` °C.
pub fn co2_density_to_ppm(t: f64, density: f64) -> f64 {
    1e6 * MOLAR_GAS_CONSTANT * (t + KELVIN) * density / (ATMOSPHERIC_PRESSURE * MOLAR_MASS_CO2)
}

/// CO2 molar concentration in ppm from the model's density unit, mg/m^3.
pub fn co2_mg_to_ppm(t: f64, mg_per_m3: f64) -> f64 {
    co2_density_to_ppm(t, 1e-6 * mg_per_m3)
}

/// CO2 density in mg/m^3 from ppm.
pub fn co2_ppm_to_mg(t: f64, ppm: f64) -> f64 {
    1e6 * co2_ppm_to_density(t, ppm)
}
