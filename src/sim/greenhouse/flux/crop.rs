//! Canopy photosynthesis, carbohydrate partitioning, respiration and harvest.

use super::exchange::{logistic, smooth_harvest};
use super::{FluxInputs, RadiationFluxes};
use crate::sim::greenhouse::psychro::co2_mg_to_ppm;
use crate::sim::greenhouse::record::named_record;

const KELVIN: f64 = 273.15;
const SECONDS_PER_DAY: f64 = 86400.0;
const MIN_LAI: f64 = 1e-6;
const MIN_STOMATAL_CO2: f64 = 1e-6;

named_record! {
    /// Crop carbon flows in mg CH2O/(m^2*s) unless noted.
    #[derive(Default)]
    pub struct CropFluxes {
        /// PAR absorbed by the canopy in umol/(m^2*s).
        par_can,
        /// Gross canopy photosynthesis in umol CO2/(m^2*s).
        gross_photosynthesis,
        /// Photorespiration in umol CO2/(m^2*s).
        photorespiration,
        /// Net photosynthesis into the carbohydrate buffer.
        mc_air_buf,
        mc_buf_leaf,
        mc_buf_stem,
        mc_buf_fruit,
        /// Growth respiration.
        mc_buf_air,
        /// Maintenance respiration of leaves.
        mc_leaf_air,
        mc_stem_air,
        mc_fruit_air,
        /// Leaf pruning.
        mc_leaf_har,
        /// Fruit harvest.
        mc_fruit_har,
        /// Rate of the 24 hour mean canopy temperature in °C/s.
        t_can_24_rate,
        /// Rate of the canopy temperature sum in °C*day/s.
        t_can_sum_rate,
    }
}

/// Inhibition of fruit growth by development stage, a smoothed clamp of
/// `t_can_sum / t_end` to [0, 1].
pub fn development_stage(t_can_sum: f64, t_end: f64) -> f64 {
    let ramp = |x: f64| 0.5 * (x + (x * x + 1e-4).sqrt());
    let x = t_can_sum / t_end;
    ramp(x) - ramp(x - 1.0)
}

pub(crate) fn compute(inp: &FluxInputs, rad: &RadiationFluxes) -> CropFluxes {
    let cr = &inp.p.crop;
    let c = &inp.p.constants;
    let x = &inp.x;

    // Electron transport and gross photosynthesis
    let par_can = inp.p.lamps.par_photon_ratio * rad.r_par_lamp_can
        + cr.sun_par_photon_ratio * rad.r_par_sun_can;
    let j25_can = inp.lai * cr.j25_leaf_max;
    let leaf_to_canopy = 1.0 / inp.lai.max(MIN_LAI);
    let gamma = leaf_to_canopy * cr.c_gamma * x.t_can + 20.0 * cr.c_gamma * (1.0 - leaf_to_canopy);
    let co2_stom =
        (cr.stomata_co2_ratio * co2_mg_to_ppm(x.t_air, x.co2_air)).max(MIN_STOMATAL_CO2);

    let r = 1e-3 * c.gas_constant;
    let t_k = x.t_can + KELVIN;
    let t_25 = cr.reference_temperature;
    let s = cr.entropy_term;
    let h = cr.deactivation_energy;
    let j_pot = j25_can
        * (cr.activation_energy * (t_k - t_25) / (r * t_k * t_25)).exp()
        * (1.0 + ((s * t_25 - h) / (r * t_25)).exp())
        / (1.0 + ((s * t_k - h) / (r * t_k)).exp());
    let light = cr.light_use_efficiency * par_can;
    let theta = cr.curvature;
    let j = (j_pot + light
        - ((j_pot + light).powi(2) - 4.0 * theta * j_pot * light).max(0.0).sqrt())
        / (2.0 * theta);

    // No uptake below the CO2 compensation point
    let gross = (j * (co2_stom - gamma) / (4.0 * (co2_stom + 2.0 * gamma))).max(0.0);
    let photorespiration = gross * gamma / co2_stom;
    let buffer_not_full = 1.0 / (1.0 + (5e-4 * (x.c_buf - cr.buffer_max)).min(700.0).exp());
    let net = (gross - photorespiration).max(0.0);
    let mc_air_buf = c.molar_mass_ch2o * buffer_not_full * net;

    // Partitioning
    let g_t_can_24 = 0.047 * x.t_can_24 + 0.06;
    let h_t_can_24 = logistic(1.1587, x.t_can_24 - cr.t_can_24_min)
        * logistic(-1.3904, x.t_can_24 - cr.t_can_24_max);
    let h_t_can =
        logistic(0.869, x.t_can - cr.t_can_min) * logistic(-0.5793, x.t_can - cr.t_can_max);
    let h_t_can_sum = development_stage(x.t_can_sum, cr.temperature_sum_end);
    let h_buf_org = logistic(5e-3, x.c_buf - cr.buffer_min);

    let vegetative = h_buf_org * h_t_can_24 * g_t_can_24;
    let mc_buf_leaf = vegetative * cr.leaf_growth_rate;
    let mc_buf_stem = vegetative * cr.stem_growth_rate;
    let mc_buf_fruit = vegetative * h_t_can * h_t_can_sum * cr.fruit_growth_rate;
    let mc_buf_air = cr.leaf_growth_cost * mc_buf_leaf
        + cr.stem_growth_cost * mc_buf_stem
        + cr.fruit_growth_cost * mc_buf_fruit;

    // Maintenance respiration
    let maintenance = (1.0 - (-cr.rgr_coefficient * cr.relative_growth_rate).exp())
        * cr.q10_maintenance.powf(0.1 * (x.t_can_24 - 25.0));

    CropFluxes {
        par_can,
        gross_photosynthesis: gross,
        photorespiration,
        mc_air_buf,
        mc_buf_leaf,
        mc_buf_stem,
        mc_buf_fruit,
        mc_buf_air,
        mc_leaf_air: maintenance * x.c_leaf * cr.leaf_maintenance,
        mc_stem_air: maintenance * x.c_stem * cr.stem_maintenance,
        mc_fruit_air: maintenance * x.c_fruit * cr.fruit_maintenance,
        mc_leaf_har: smooth_harvest(x.c_leaf, cr.leaf_max(), 1e4, 5e4),
        mc_fruit_har: smooth_harvest(x.c_fruit, cr.fruit_max, 1e4, 5e4),
        t_can_24_rate: (x.t_can - x.t_can_24) / SECONDS_PER_DAY,
        t_can_sum_rate: x.t_can / SECONDS_PER_DAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::greenhouse::control::ActuatorPosition;
    use crate::sim::greenhouse::flux::radiation;
    use crate::sim::greenhouse::params::ParameterSet;
    use crate::sim::greenhouse::state::State;
    use crate::sim::greenhouse::weather::WeatherSample;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn evaluate(state: &State, i_glob: f64) -> CropFluxes {
        let p = ParameterSet::new();
        let d = p.derived();
        let w = WeatherSample {
            i_glob,
            co2_out: 740.0,
            ..WeatherSample::default()
        };
        let inp = FluxInputs::new(&p, &d, state, &ActuatorPosition::default(), &w);
        let rad = radiation::compute(&inp);
        compute(&inp, &rad)
    }

    fn mature() -> State {
        let p = ParameterSet::new();
        let mut s = State::mature(&p, &WeatherSample::default());
        s.co2_air = 1400.0;
        s.t_can = 22.0;
        s.t_can_24 = 20.0;
        s.c_buf = 5e3;
        s
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(0.5, 0.5)]
    #[case(1.0, 1.0)]
    #[case(2.0, 1.0)]
    fn test_development_stage(#[case] ratio: f64, #[case] expected: f64) {
        assert_relative_eq!(development_stage(ratio * 1035.0, 1035.0), expected, epsilon = 1e-2);
    }

    #[test]
    fn test_no_photosynthesis_in_the_dark() {
        let f = evaluate(&mature(), 0.0);
        assert_eq!(f.par_can, 0.0);
        assert_eq!(f.gross_photosynthesis, 0.0);
        assert_eq!(f.mc_air_buf, 0.0);
        // Respiration continues
        assert!(f.mc_leaf_air > 0.0 && f.mc_buf_air > 0.0);
    }

    #[test]
    fn test_light_drives_assimilation() {
        let dim = evaluate(&mature(), 100.0);
        let bright = evaluate(&mature(), 500.0);
        assert!(dim.mc_air_buf > 0.0);
        assert!(bright.mc_air_buf > dim.mc_air_buf);
        assert!(bright.photorespiration < bright.gross_photosynthesis);
    }

    #[test]
    fn test_more_co2_more_assimilation() {
        let mut low = mature();
        low.co2_air = 700.0;
        let high = mature();
        assert!(evaluate(&high, 300.0).mc_air_buf > evaluate(&low, 300.0).mc_air_buf);
    }

    #[test]
    fn test_no_assimilation_below_compensation_point() {
        let mut s = mature();
        let mut previous = f64::INFINITY;
        for co2 in [700.0, 100.0, 30.0, 5.0, 0.0] {
            s.co2_air = co2;
            let f = evaluate(&s, 350.0);
            assert!(f.gross_photosynthesis >= 0.0);
            assert!(f.photorespiration <= f.gross_photosynthesis);
            assert!(f.mc_air_buf >= 0.0);
            assert!(f.mc_air_buf <= previous, "uptake grew to {} at {co2}", f.mc_air_buf);
            previous = f.mc_air_buf;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn test_empty_buffer_stops_growth() {
        let mut s = mature();
        s.c_buf = 0.0;
        let f = evaluate(&s, 0.0);
        let full = evaluate(&mature(), 0.0);
        assert!(f.mc_buf_fruit < 0.01 * full.mc_buf_fruit);
    }

    #[test]
    fn test_harvest_above_threshold() {
        let mut s = mature();
        s.c_fruit = 3.5e5;
        let f = evaluate(&s, 0.0);
        assert!(f.mc_fruit_har > 0.99 * 5e4);
        let seedling = State::cold_start(&ParameterSet::new(), &WeatherSample::default());
        let young = evaluate(&seedling, 0.0);
        assert!(young.mc_fruit_har < 1e-6);
        assert!(young.mc_leaf_har < 1e-6);
    }

    #[test]
    fn test_temperature_memory_rates() {
        let f = evaluate(&mature(), 0.0);
        assert_relative_eq!(f.t_can_24_rate, 2.0 / 86400.0, epsilon = 1e-15);
        assert_relative_eq!(f.t_can_sum_rate, 22.0 / 86400.0, epsilon = 1e-15);
    }
}
