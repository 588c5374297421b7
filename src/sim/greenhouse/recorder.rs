use anyhow::Result;

use crate::sim::coupling::StepIndex;
use crate::sim::framework::{Bus, SimContext, SimModule};

use super::control::ActuatorPosition;
use super::engine::StepOutcome;
use super::state::State;
use super::trajectory::{Trajectory, TrajectoryStep};
use super::weather::WeatherSample;

/// Bus-stored recording buffer.
///
/// The workflow is:
/// 1) [`RecorderModule`] initializes this on the Bus from the initial state,
/// 2) the recorder appends one step per pipeline step,
/// 3) the caller takes the data from the Bus and finalizes it into a
///    [`Trajectory`].
#[derive(Debug, Default)]
pub struct RecorderData {
    trajectory: Trajectory,
}

impl RecorderData {
    fn push_step(
        &mut self,
        index: usize,
        weather: &WeatherSample,
        actuators: &ActuatorPosition,
        outcome: &StepOutcome,
    ) -> Result<()> {
        anyhow::ensure!(
            index == self.trajectory.len(),
            "RecorderData::push_step: step {index} recorded out of order (have {} steps)",
            self.trajectory.len()
        );
        self.trajectory.push(TrajectoryStep {
            index,
            time_s: weather.time_s,
            state: outcome.state,
            actuators: *actuators,
            flux: outcome.flux,
            totals: outcome.totals,
            clamps: outcome.clamps.clone(),
        });
        Ok(())
    }

    pub fn finalize(self) -> Trajectory {
        self.trajectory
    }
}

/// Appends the [`StepOutcome`] of each step to the [`RecorderData`] on the Bus.
pub struct RecorderModule;

impl RecorderModule {
    pub fn new() -> Self {
        Self
    }

    /// Removes the recorder data from the Bus and returns the trajectory.
    pub fn take_result(bus: &mut Bus) -> Result<Trajectory> {
        let Some(data) = bus.take::<RecorderData>() else {
            anyhow::bail!("RecorderData not found on Bus");
        };
        Ok(data.finalize())
    }
}

impl Default for RecorderModule {
    fn default() -> Self {
        Self::new()
    }
}

impl SimModule for RecorderModule {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn init(&mut self, _ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        let Some(initial) = bus.get::<State>().copied() else {
            anyhow::bail!("RecorderModule: initial State not found on Bus");
        };
        bus.put(RecorderData {
            trajectory: Trajectory::new(initial),
        });
        Ok(())
    }

    fn step(&mut self, _ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        let Some(StepIndex(index)) = bus.get::<StepIndex>().copied() else {
            anyhow::bail!("RecorderModule: StepIndex not found on Bus");
        };
        let Some(weather) = bus.get::<WeatherSample>().copied() else {
            anyhow::bail!("RecorderModule: WeatherSample not found on Bus");
        };
        let Some(actuators) = bus.get::<ActuatorPosition>().copied() else {
            anyhow::bail!("RecorderModule: ActuatorPosition not found on Bus");
        };
        let Some(outcome) = bus.take::<StepOutcome>() else {
            anyhow::bail!("RecorderModule: StepOutcome not found on Bus");
        };
        let Some(data) = bus.get_mut::<RecorderData>() else {
            anyhow::bail!("RecorderModule: RecorderData not initialized");
        };
        data.push_step(index, &weather, &actuators, &outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::greenhouse::engine::StepTotals;
    use crate::sim::greenhouse::flux::FluxSet;
    use crate::sim::greenhouse::horizon::Horizon;
    use crate::sim::greenhouse::params::ParameterSet;

    fn outcome(state: State) -> StepOutcome {
        StepOutcome {
            state,
            flux: FluxSet::default(),
            totals: StepTotals::default(),
            clamps: Vec::new(),
            substeps: 1,
        }
    }

    #[test]
    fn test_recorder_appends_and_takes_result() -> Result<()> {
        let params = ParameterSet::new();
        let horizon = Horizon::from_days(1.0, 1.0, 300.0);
        let ctx = SimContext::new(&params, &horizon);
        let initial = State::cold_start(&params, &WeatherSample::default());

        let mut bus = Bus::new();
        bus.put(initial);
        let mut recorder = RecorderModule::new();
        recorder.init(&ctx, &mut bus)?;

        for i in 0..3 {
            let mut next = initial;
            next.t_air += i as f64;
            bus.put(StepIndex(i));
            bus.put(WeatherSample {
                time_s: 300.0 * i as f64,
                ..WeatherSample::default()
            });
            bus.put(ActuatorPosition::default());
            bus.put(outcome(next));
            recorder.step(&ctx, &mut bus)?;
        }

        let t = RecorderModule::take_result(&mut bus)?;
        assert_eq!(t.len(), 3);
        assert_eq!(t.steps()[2].time_s, 600.0);
        assert_eq!(t.terminal_state().map(|s| s.t_air), Some(initial.t_air + 2.0));
        assert!(RecorderModule::take_result(&mut bus).is_err());
        Ok(())
    }

    #[test]
    fn test_missing_outcome_is_an_error() {
        let params = ParameterSet::new();
        let horizon = Horizon::from_days(1.0, 1.0, 300.0);
        let ctx = SimContext::new(&params, &horizon);
        let mut bus = Bus::new();
        bus.put(State::cold_start(&params, &WeatherSample::default()));
        let mut recorder = RecorderModule::new();
        recorder.init(&ctx, &mut bus).unwrap();
        bus.put(StepIndex(0));
        bus.put(WeatherSample::default());
        bus.put(ActuatorPosition::default());
        assert!(recorder.step(&ctx, &mut bus).is_err());
    }
}
