use serde::{Deserialize, Serialize};

use super::horizon::{day_of_year, hour_of_day};
use super::params::ParameterSet;
use super::psychro::{co2_mg_to_ppm, relative_humidity};
use super::record::named_record;
use super::state::State;
use super::weather::WeatherSample;

named_record! {
    /// Actuator positions, each a fraction in [0, 1].
    #[derive(Default)]
    pub struct ActuatorPosition {
        /// Roof vent aperture.
        roof,
        /// Thermal screen closure.
        th_scr,
        /// Heating valve (share of boiler capacity).
        boil,
        /// Lamp switch (share of maximum lamp input).
        lamp,
        /// CO2 injection (share of injection capacity).
        ext_co2,
    }
}

impl ActuatorPosition {
    /// Copy with every position limited to [0, 1].
    pub fn clamped(&self) -> Self {
        Self {
            roof: self.roof.clamp(0.0, 1.0),
            th_scr: self.th_scr.clamp(0.0, 1.0),
            boil: self.boil.clamp(0.0, 1.0),
            lamp: self.lamp.clamp(0.0, 1.0),
            ext_co2: self.ext_co2.clamp(0.0, 1.0),
        }
    }
}

/// Proportional controller response.
///
/// Maps `(pv - sp) / band`, limited to [0, 1], linearly onto [`min`, `max`].
/// With a negative band the response grows as `pv` falls below `sp`.
pub fn p_band(pv: f64, sp: f64, band: f64, min: f64, max: f64) -> f64 {
    if band == 0.0 {
        return if pv >= sp { max } else { min };
    }
    let x = ((pv - sp) / band).clamp(0.0, 1.0);
    min + (max - min) * x
}

/// Computes actuator positions from the current state and outdoor conditions.
pub trait ControlPolicy: Send + Sync {
    fn actuate(&self, state: &State, params: &ParameterSet, weather: &WeatherSample)
    -> ActuatorPosition;
}

impl<F> ControlPolicy for F
where
    F: Fn(&State, &ParameterSet, &WeatherSample) -> ActuatorPosition + Send + Sync,
{
    fn actuate(
        &self,
        state: &State,
        params: &ParameterSet,
        weather: &WeatherSample,
    ) -> ActuatorPosition {
        self(state, params, weather)
    }
}

/// Intermediate control quantities of the rule-based policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSignals {
    /// 1 when the sun or the lamps light the greenhouse.
    pub is_day_inside: f64,
    /// Lamp permission before climate constraints.
    pub lamp_no_cons: f64,
    /// Heating setpoint in °C.
    pub heat_sp: f64,
    /// Temperature above which ventilation starts in °C.
    pub heat_max: f64,
    /// CO2 setpoint in ppm.
    pub co2_sp: f64,
    /// Indoor CO2 in ppm.
    pub co2_ppm: f64,
    /// Indoor relative humidity in %.
    pub rh_in: f64,
}

/// Default greenhouse climate computer: heating, CO2, ventilation, screen and
/// lamps by proportional bands around day/night setpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedPolicy;

impl RuleBasedPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn signals(
        &self,
        state: &State,
        params: &ParameterSet,
        weather: &WeatherSample,
    ) -> ControlSignals {
        let c = &params.control;
        let lamps_installed = params.lamps.max_intensity > 0.0;
        let tod = hour_of_day(weather.time_s);
        let doy = day_of_year(weather.time_s);

        let day_window = indicator(doy > c.day_lamp_start && doy < c.day_lamp_stop);
        let below_rad_sum = indicator(weather.day_rad_sum < c.lamp_rad_sum_limit);
        let time_window = indicator(in_daily_window(tod, c.lamps_on, c.lamps_off));
        let sun_low = indicator(weather.i_glob < c.lamps_off_sun);

        let (lamp_no_cons, smooth_lamp) = if lamps_installed {
            (
                sun_low * below_rad_sum * time_window * day_window,
                smooth_daily_window(tod, c.lamps_on, c.lamps_off) * below_rad_sum * day_window,
            )
        } else {
            (0.0, 0.0)
        };
        let is_day_inside = smooth_lamp.max(weather.is_day);

        let heat_sp = is_day_inside * c.t_sp_day
            + (1.0 - is_day_inside) * c.t_sp_night
            + params.lamps.heat_correction * lamp_no_cons;

        ControlSignals {
            is_day_inside,
            lamp_no_cons,
            heat_sp,
            heat_max: heat_sp + c.heat_dead_zone,
            co2_sp: is_day_inside * c.co2_sp_day,
            co2_ppm: co2_mg_to_ppm(state.t_air, state.co2_air.max(0.0)),
            rh_in: relative_humidity(state.t_air, state.vp_air.max(0.0)),
        }
    }
}

impl ControlPolicy for RuleBasedPolicy {
    fn actuate(
        &self,
        state: &State,
        params: &ParameterSet,
        weather: &WeatherSample,
    ) -> ActuatorPosition {
        let c = &params.control;
        let s = self.signals(state, params, weather);
        let t_air = state.t_air;

        let boil = p_band(t_air, s.heat_sp, c.heat_band, 0.0, 1.0);
        let ext_co2 = p_band(s.co2_ppm, s.co2_sp, c.co2_band, 0.0, 1.0);

        let vent_heat = p_band(t_air, s.heat_max, c.vent_heat_pband, 0.0, 1.0);
        let vent_rh = p_band(s.rh_in, c.rh_max, c.vent_rh_pband, 0.0, 1.0);
        let vent_cold = p_band(t_air, s.heat_sp - c.vent_off, c.vent_cold_pband, 1.0, 0.0);
        let roof = vent_cold.min(vent_heat.max(vent_rh));

        let th_scr_sp =
            weather.is_day * c.th_scr_sp_day + (1.0 - weather.is_day) * c.th_scr_sp_night;
        let th_scr_cold = p_band(weather.t_out, th_scr_sp, c.th_scr_pband, 0.0, 1.0);
        let th_scr_heat = p_band(
            t_air,
            s.heat_sp + c.th_scr_dead_zone,
            -c.th_scr_pband,
            1.0,
            0.0,
        );
        let th_scr_rh = p_band(s.rh_in, c.rh_max + c.th_scr_rh, c.th_scr_rh_pband, 1.0, 0.0)
            .max(1.0 - vent_cold);
        let th_scr = th_scr_cold.min(th_scr_heat).min(th_scr_rh);

        // Lamps go off when too hot, and at night when too humid unless cold
        let lamp_heat = p_band(t_air, s.heat_max + c.lamp_extra_heat, -0.5, 0.0, 1.0);
        let lamp_rh =
            p_band(s.rh_in, c.rh_max + c.lamp_rh_extra, -0.5, 0.0, 1.0).max(1.0 - vent_cold);
        let lamp = s.lamp_no_cons
            * lamp_heat
            * (weather.is_day_smooth + (1.0 - weather.is_day_smooth) * lamp_rh);

        ActuatorPosition {
            roof,
            th_scr,
            boil,
            lamp,
            ext_co2,
        }
        .clamped()
    }
}

/// Optional per-actuator values replacing the base policy's decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorOverrides {
    pub roof: Option<f64>,
    pub th_scr: Option<f64>,
    pub boil: Option<f64>,
    pub lamp: Option<f64>,
    pub ext_co2: Option<f64>,
}

impl ActuatorOverrides {
    pub fn apply(&self, base: ActuatorPosition) -> ActuatorPosition {
        ActuatorPosition {
            roof: self.roof.unwrap_or(base.roof),
            th_scr: self.th_scr.unwrap_or(base.th_scr),
            boil: self.boil.unwrap_or(base.boil),
            lamp: self.lamp.unwrap_or(base.lamp),
            ext_co2: self.ext_co2.unwrap_or(base.ext_co2),
        }
        .clamped()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A base policy with fixed overrides on top.
#[derive(Debug, Clone, Default)]
pub struct OverridePolicy<P> {
    pub base: P,
    pub overrides: ActuatorOverrides,
}

impl<P: ControlPolicy> OverridePolicy<P> {
    pub fn new(base: P, overrides: ActuatorOverrides) -> Self {
        Self { base, overrides }
    }
}

impl<P: ControlPolicy> ControlPolicy for OverridePolicy<P> {
    fn actuate(
        &self,
        state: &State,
        params: &ParameterSet,
        weather: &WeatherSample,
    ) -> ActuatorPosition {
        self.overrides
            .apply(self.base.actuate(state, params, weather))
    }
}

fn indicator(cond: bool) -> f64 {
    if cond { 1.0 } else { 0.0 }
}

/// Whether `hour` lies in [`on`, `off`), wrapping past midnight when `on > off`.
fn in_daily_window(hour: f64, on: f64, off: f64) -> bool {
    if on < off {
        hour >= on && hour < off
    } else if on > off {
        hour >= on || hour < off
    } else {
        false
    }
}

/// Daily window with one-hour linear ramps before switching on and after
/// switching off.
fn smooth_daily_window(hour: f64, on: f64, off: f64) -> f64 {
    if on == off {
        return 0.0;
    }
    let switch_on = (hour - on + 1.0).clamp(0.0, 1.0);
    let switch_off = (off - hour + 1.0).clamp(0.0, 1.0);
    if on < off {
        switch_on.min(switch_off)
    } else {
        switch_on.max(switch_off)
    }
}
