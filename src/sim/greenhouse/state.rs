use super::params::ParameterSet;
use super::psychro::saturation_vapor_pressure;
use super::record::named_record;
use super::weather::WeatherSample;
use crate::error::ConfigurationError;

named_record! {
    /// Complete dynamic state of the greenhouse and its crop.
    ///
    /// Temperatures in °C, vapor pressures in Pa, CO2 in mg/m^3 and carbon
    /// pools in mg CH2O/m^2 floor.
    #[derive(Default)]
    pub struct State {
        /// CO2 in the main compartment.
        co2_air,
        /// CO2 in the top compartment.
        co2_top,
        /// Main compartment air.
        t_air,
        /// Top compartment air.
        t_top,
        /// Canopy.
        t_can,
        /// Internal cover surface.
        t_cov_in,
        /// External cover surface.
        t_cov_e,
        /// Thermal screen.
        t_th_scr,
        /// Floor.
        t_flr,
        /// Heating pipes.
        t_pipe,
        t_so1,
        t_so2,
        t_so3,
        t_so4,
        t_so5,
        /// Vapor pressure of the main compartment.
        vp_air,
        /// Vapor pressure of the top compartment.
        vp_top,
        /// Lamps.
        t_lamp,
        /// 24 hour mean canopy temperature.
        t_can_24,
        /// Carbohydrate buffer.
        c_buf,
        /// Leaf dry weight.
        c_leaf,
        /// Stem dry weight.
        c_stem,
        /// Fruit dry weight.
        c_fruit,
        /// Canopy temperature sum since planting in °C*day.
        t_can_sum,
        /// Cumulative harvested fruit dry weight.
        harvested_fruit,
    }
}

/// Total dry weight of a young crop at planting in mg CH2O/m^2.
const PLANTING_DRY_WEIGHT: f64 = 6240.0;

impl State {
    /// Climate at the night setpoint and a freshly planted crop.
    ///
    /// Soil layers are interpolated between the air and the external soil
    /// temperature.
    pub fn cold_start(params: &ParameterSet, weather: &WeatherSample) -> Self {
        let t_air = params.control.t_sp_night;
        let t_so_out = weather.t_so_out;
        let vp_air = params.control.rh_max / 100.0 * saturation_vapor_pressure(t_air);
        let t_can = t_air + 4.0;
        Self {
            co2_air: weather.co2_out,
            co2_top: weather.co2_out,
            t_air,
            t_top: t_air,
            t_can,
            t_cov_in: t_air,
            t_cov_e: t_air,
            t_th_scr: t_air,
            t_flr: t_air,
            t_pipe: t_air,
            t_so1: t_air,
            t_so2: 0.25 * (3.0 * t_air + t_so_out),
            t_so3: 0.25 * (2.0 * t_air + 2.0 * t_so_out),
            t_so4: 0.25 * (t_air + 3.0 * t_so_out),
            t_so5: t_so_out,
            vp_air,
            vp_top: vp_air,
            t_lamp: t_air,
            t_can_24: t_can,
            c_buf: 0.0,
            c_leaf: 0.7 * PLANTING_DRY_WEIGHT,
            c_stem: 0.25 * PLANTING_DRY_WEIGHT,
            c_fruit: 0.05 * PLANTING_DRY_WEIGHT,
            t_can_sum: 0.0,
            harvested_fruit: 0.0,
        }
    }

    /// Same climate as [`State::cold_start`] with a fully developed, fruiting crop.
    pub fn mature(params: &ParameterSet, weather: &WeatherSample) -> Self {
        Self {
            c_fruit: 2.8e5,
            c_leaf: 0.9e5,
            c_stem: 2.5e5,
            t_can_sum: 3000.0,
            ..Self::cold_start(params, weather)
        }
    }

    /// Leaf area index in m^2 leaf/m^2 floor.
    pub fn lai(&self, params: &ParameterSet) -> f64 {
        params.crop.specific_leaf_area * self.c_leaf
    }

    /// Soil layer temperatures from top to bottom.
    pub fn soil(&self) -> [f64; 5] {
        [self.t_so1, self.t_so2, self.t_so3, self.t_so4, self.t_so5]
    }

    /// Rejects a starting state with a NaN or infinite component.
    pub fn ensure_finite(&self) -> Result<(), ConfigurationError> {
        match self.first_non_finite() {
            Some((name, value)) => Err(ConfigurationError::NonFinite {
                name: format!("initial_state.{name}"),
                value,
            }),
            None => Ok(()),
        }
    }

    /// Serializes the state as a JSON resume token.
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        serde_json::from_str(content).context("Invalid state JSON")
    }
}
