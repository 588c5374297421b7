//! Scenario tests of whole-greenhouse behavior.
//!
//! Horizons are kept to hours where possible: every 5-minute step runs a few
//! hundred sub-steps.

use std::sync::Arc;

use approx::assert_relative_eq;
use greenhouse::sim::greenhouse::integrator::{capacities, stored_co2, stored_heat};
use greenhouse::sim::greenhouse::psychro::relative_humidity;
use greenhouse::sim::greenhouse::weather::{ArtificialWeather, ConstantOverrides, WeatherSeries};
use greenhouse::{
    ActuatorPosition, Horizon, ParameterSet, RunOutput, Simulation, State, WeatherProvider,
    WeatherSample,
};

const DAY: f64 = 86400.0;

fn mature(params: &ParameterSet) -> State {
    let mut s = State::mature(params, &ArtificialWeather.reading(0.0).unwrap());
    s.c_buf = 5e3;
    s
}

fn run(
    params: ParameterSet,
    horizon: Horizon,
    weather: Arc<dyn WeatherProvider>,
    init: State,
) -> RunOutput {
    Simulation::new(Arc::new(params), horizon, weather)
        .with_initial_state(init)
        .run()
        .unwrap()
}

/// Start state of every recorded step.
fn step_starts(out: &RunOutput) -> Vec<State> {
    let mut starts = vec![*out.trajectory.initial_state().unwrap()];
    starts.extend(out.trajectory.steps().iter().map(|s| s.state));
    starts.pop();
    starts
}

#[test]
fn energy_and_co2_balance_every_step() {
    let params = ParameterSet::new();
    let derived = params.derived();
    let horizon = Horizon::new(60.0 * DAY + 10.0 * 3600.0, 1200.0, 300.0);
    let out = run(params.clone(), horizon, Arc::new(ArtificialWeather), mature(&params));
    assert_eq!(out.trajectory.len(), 4);

    for (start, step) in step_starts(&out).iter().zip(out.trajectory.steps()) {
        let caps = capacities(&params, &derived, start);
        let t = &step.totals;

        let heat = stored_heat(&caps, &step.state) - stored_heat(&caps, start);
        assert_relative_eq!(heat, t.external_heat_j, max_relative = 1e-3, epsilon = 20.0);

        let co2 = stored_co2(&caps, &step.state) - stored_co2(&caps, start);
        let expected = t.co2_injected_mg - t.co2_vented_mg - t.co2_assimilated_mg;
        assert_relative_eq!(co2, expected, max_relative = 1e-6, epsilon = 1e-3);
    }
}

#[test]
fn harvest_is_monotone() {
    let params = ParameterSet::new();
    let mut ripe = mature(&params);
    ripe.c_fruit = 3.5e5;
    let horizon = Horizon::new(90.0 * DAY, 3600.0, 300.0);
    let out = run(params.clone(), horizon, Arc::new(ArtificialWeather), ripe);

    let mut previous = ripe.harvested_fruit;
    for step in out.trajectory.steps() {
        assert!(step.state.harvested_fruit >= previous);
        assert!(step.totals.harvest_dry_mg >= 0.0);
        previous = step.state.harvested_fruit;
    }
    assert!(previous > ripe.harvested_fruit);
    let summary = out.trajectory.summary(300.0, params.crop.dry_matter_content);
    assert_relative_eq!(
        summary.harvest_dry_kg,
        (previous - ripe.harvested_fruit) * 1e-6,
        max_relative = 1e-9
    );
}

#[test]
fn two_segments_equal_one() {
    let params = ParameterSet::new();
    let init = mature(&params);
    let weather: Arc<dyn WeatherProvider> = Arc::new(ArtificialWeather);
    let whole = Horizon::new(120.0 * DAY + 6.0 * 3600.0, 1800.0, 300.0);
    let first = Horizon::new(whole.start_s, 900.0, 300.0);
    let second = first.following(900.0);

    let one = run(params.clone(), whole, weather.clone(), init);
    let a = run(params.clone(), first, weather.clone(), init);
    let b = run(params, second, weather, a.terminal_state);

    for (x, y) in one.terminal_state.values().iter().zip(b.terminal_state.values()) {
        assert_relative_eq!(*x, y, max_relative = 1e-9, epsilon = 1e-9);
    }

    let mut joined = a.trajectory.clone();
    joined.extend(b.trajectory);
    assert_eq!(joined.len(), one.trajectory.len());
    for (x, y) in joined.steps().iter().zip(one.trajectory.steps()) {
        assert_eq!(x.index, y.index);
        assert_eq!(x.time_s, y.time_s);
        assert_eq!(x.actuators, y.actuators);
    }
}

#[test]
fn dark_heating_holds_the_setpoint() {
    let params = ParameterSet::new();
    let weather = ConstantOverrides {
        i_glob: Some(0.0),
        t_out: Some(5.0),
        ..ConstantOverrides::new(ArtificialWeather)
    };
    let mut init = mature(&params);
    init.t_can = init.t_air;
    init.t_can_24 = init.t_air;

    let horizon = Horizon::new(30.0 * DAY, 6.0 * 3600.0, 300.0);
    let out = run(params.clone(), horizon, Arc::new(weather), init);

    let sp = params.control.t_sp_night;
    let band = params.control.heat_band.abs();
    let mut heated = false;
    for step in out.trajectory.steps() {
        assert_eq!(step.actuators.lamp, 0.0);
        assert!(step.state.t_air <= sp + band, "t_air = {}", step.state.t_air);
        heated |= step.actuators.boil > 0.0;
    }
    assert!(heated);
    let last = out.terminal_state.t_air;
    assert!(last >= sp - 2.0 * band && last <= sp + band, "t_air = {last}");
    assert!(out.trajectory.totals().heating_j > 0.0);
}

#[test]
fn closed_vents_accumulate_vapor() {
    let params = ParameterSet::new();
    let weather = ConstantOverrides {
        i_glob: Some(400.0),
        t_out: Some(20.0),
        ..ConstantOverrides::new(ArtificialWeather)
    };
    let mut init = mature(&params);
    for t in [
        &mut init.t_air,
        &mut init.t_top,
        &mut init.t_can,
        &mut init.t_cov_in,
        &mut init.t_cov_e,
        &mut init.t_th_scr,
        &mut init.t_flr,
        &mut init.t_pipe,
    ] {
        *t = 20.0;
    }
    init.vp_air = 1500.0;
    init.vp_top = 1500.0;

    let closed = |_: &State, _: &ParameterSet, _: &WeatherSample| ActuatorPosition::default();
    let horizon = Horizon::new(150.0 * DAY + 11.0 * 3600.0, 2.0 * 3600.0, 300.0);
    let out = Simulation::new(Arc::new(params), horizon, Arc::new(weather))
        .with_policy(Arc::new(closed))
        .with_initial_state(init)
        .run()
        .unwrap();

    let mut previous = init.vp_air;
    for step in out.trajectory.steps() {
        let vp = step.state.vp_air;
        assert!(vp >= previous * (1.0 - 1e-3), "vp_air fell from {previous} to {vp}");
        assert!(relative_humidity(step.state.t_air, vp) <= 100.5);
        previous = vp;
    }
    assert!(out.terminal_state.vp_air > init.vp_air + 100.0);
}

#[test]
fn one_and_five_minute_steps_agree_over_a_day() {
    let params = ParameterSet::new();
    let weather: Arc<dyn WeatherProvider> = Arc::new(ConstantOverrides {
        t_out: Some(5.0),
        ..ConstantOverrides::new(ArtificialWeather)
    });
    let mut init = mature(&params);
    init.c_fruit = 3.5e5;

    let start = 45.0 * DAY;
    let fine_horizon = Horizon::new(start, DAY, 60.0);
    let coarse_horizon = Horizon::new(start, DAY, 300.0);

    // Same forcing at every shared instant
    let fine_weather = WeatherSeries::materialize(weather.as_ref(), &fine_horizon).unwrap();
    let coarse_weather = WeatherSeries::materialize(weather.as_ref(), &coarse_horizon).unwrap();
    for (j, c) in coarse_weather.samples.iter().enumerate() {
        let f = &fine_weather.samples[5 * j];
        assert_eq!(f.time_s, c.time_s);
        assert_eq!(f.is_day, c.is_day, "is_day at {} s", c.time_s);
        assert_eq!(f.is_day_smooth, c.is_day_smooth, "is_day_smooth at {} s", c.time_s);
        assert_eq!(f.day_rad_sum, c.day_rad_sum);
    }

    let fine = run(params.clone(), fine_horizon, weather.clone(), init);
    let coarse = run(params.clone(), coarse_horizon, weather, init);
    let dmc = params.crop.dry_matter_content;
    let f = fine.trajectory.summary(60.0, dmc);
    let c = coarse.trajectory.summary(300.0, dmc);

    assert_eq!(f.end_s, c.end_s);
    assert!(f.heating_mj > 0.0);
    assert_relative_eq!(f.heating_mj, c.heating_mj, max_relative = 0.08);
    assert_relative_eq!(f.fresh_yield_kg, c.fresh_yield_kg, max_relative = 0.05);
    assert_relative_eq!(f.mean_t_air, c.mean_t_air, max_relative = 0.05);
}
