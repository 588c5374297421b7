//! Recorded per-step history of a run and its export.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::control::ActuatorPosition;
use super::engine::StepTotals;
use super::flux::FluxSet;
use super::integrator::ClampFlag;
use super::state::State;

const J_PER_MJ: f64 = 1e6;
const MG_PER_KG: f64 = 1e6;

/// One recorded control step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryStep {
    pub index: usize,
    /// Start of the step in s.
    pub time_s: f64,
    /// State at the end of the step.
    pub state: State,
    /// Actuator positions held during the step.
    pub actuators: ActuatorPosition,
    /// Fluxes at the start of the step.
    pub flux: FluxSet,
    pub totals: StepTotals,
    pub clamps: Vec<ClampFlag>,
}

/// Ordered record of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trajectory {
    initial: Option<State>,
    steps: Vec<TrajectoryStep>,
}

/// Aggregates over a whole trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectorySummary {
    pub steps: usize,
    pub start_s: f64,
    pub end_s: f64,
    /// Boiler heat in MJ/m^2.
    pub heating_mj: f64,
    /// Lamp electricity in MJ/m^2.
    pub lamp_mj: f64,
    /// CO2 injected in kg/m^2.
    pub co2_injected_kg: f64,
    /// Harvested fruit dry matter in kg CH2O/m^2.
    pub harvest_dry_kg: f64,
    /// Harvested fresh fruit in kg/m^2.
    pub fresh_yield_kg: f64,
    pub clamp_events: usize,
    pub mean_t_air: f64,
    pub min_t_air: f64,
    pub max_t_air: f64,
}

/// Fresh weight in kg from a dry weight in mg CH2O.
pub fn fresh_weight_kg(dry_mg: f64, dry_matter_content: f64) -> f64 {
    dry_mg / MG_PER_KG / dry_matter_content
}

impl Trajectory {
    pub fn new(initial: State) -> Self {
        Self {
            initial: Some(initial),
            steps: Vec::new(),
        }
    }

    /// A trajectory of a run that failed before its initial state was known.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: TrajectoryStep) {
        self.steps.push(step);
    }

    pub fn initial_state(&self) -> Option<&State> {
        self.initial.as_ref()
    }

    pub fn steps(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// State after the last recorded step; the resume token of the run.
    pub fn terminal_state(&self) -> Option<&State> {
        self.steps.last().map(|s| &s.state).or(self.initial.as_ref())
    }

    /// Totals summed over all steps.
    pub fn totals(&self) -> StepTotals {
        self.steps
            .iter()
            .fold(StepTotals::default(), |acc, s| acc.add(&s.totals))
    }

    /// Appends the steps of a following segment.
    pub fn extend(&mut self, other: Trajectory) {
        if self.initial.is_none() {
            self.initial = other.initial;
        }
        let offset = self.steps.len();
        self.steps.extend(other.steps.into_iter().map(|mut s| {
            s.index += offset;
            s
        }));
    }

    pub fn summary(&self, step_s: f64, dry_matter_content: f64) -> TrajectorySummary {
        let totals = self.totals();
        let t_air: Vec<f64> = self.steps.iter().map(|s| s.state.t_air).collect();
        let (min_t_air, max_t_air, mean_t_air) = if t_air.is_empty() {
            (f64::NAN, f64::NAN, f64::NAN)
        } else {
            (
                t_air.iter().copied().fold(f64::INFINITY, f64::min),
                t_air.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                t_air.iter().sum::<f64>() / t_air.len() as f64,
            )
        };
        let start_s = self.steps.first().map_or(0.0, |s| s.time_s);
        let end_s = self.steps.last().map_or(start_s, |s| s.time_s + step_s);
        TrajectorySummary {
            steps: self.steps.len(),
            start_s,
            end_s,
            heating_mj: totals.heating_j / J_PER_MJ,
            lamp_mj: totals.lamp_j / J_PER_MJ,
            co2_injected_kg: totals.co2_injected_mg / MG_PER_KG,
            harvest_dry_kg: totals.harvest_dry_mg / MG_PER_KG,
            fresh_yield_kg: fresh_weight_kg(totals.harvest_dry_mg, dry_matter_content),
            clamp_events: self.steps.iter().map(|s| s.clamps.len()).sum(),
            mean_t_air,
            min_t_air,
            max_t_air,
        }
    }

    /// Column names of [`Trajectory::write_csv`].
    pub fn column_names() -> Vec<String> {
        let mut names = vec!["step".to_string(), "time_s".to_string()];
        names.extend(State::FIELD_NAMES.iter().map(|n| format!("state.{n}")));
        names.extend(ActuatorPosition::FIELD_NAMES.iter().map(|n| format!("actuators.{n}")));
        names.extend(FluxSet::field_names().into_iter().map(|n| format!("flux.{n}")));
        names.extend(StepTotals::FIELD_NAMES.iter().map(|n| format!("totals.{n}")));
        names.push("clamps".to_string());
        names
    }

    /// Writes one CSV row per step.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(Self::column_names())?;
        for s in &self.steps {
            let mut row = vec![s.index.to_string(), s.time_s.to_string()];
            let values = s
                .state
                .values()
                .into_iter()
                .chain(s.actuators.values())
                .chain(s.flux.values())
                .chain(s.totals.values());
            row.extend(values.map(|v| v.to_string()));
            row.push(s.clamps.len().to_string());
            w.write_record(&row)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn to_csv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_csv(file)
            .with_context(|| format!("Failed to write trajectory to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::greenhouse::params::ParameterSet;
    use crate::sim::greenhouse::weather::WeatherSample;
    use approx::assert_relative_eq;

    fn step(index: usize, t_air: f64) -> TrajectoryStep {
        let p = ParameterSet::new();
        let mut state = State::cold_start(&p, &WeatherSample::default());
        state.t_air = t_air;
        TrajectoryStep {
            index,
            time_s: 300.0 * index as f64,
            state,
            actuators: ActuatorPosition::default(),
            flux: FluxSet::default(),
            totals: StepTotals {
                heating_j: 1e6,
                harvest_dry_mg: 600.0,
                ..StepTotals::default()
            },
            clamps: Vec::new(),
        }
    }

    #[test]
    fn test_summary_converts_units() {
        let p = ParameterSet::new();
        let mut t = Trajectory::new(State::cold_start(&p, &WeatherSample::default()));
        t.push(step(0, 18.0));
        t.push(step(1, 20.0));
        let s = t.summary(300.0, 0.06);
        assert_eq!(s.steps, 2);
        assert_eq!(s.end_s, 600.0);
        assert_relative_eq!(s.heating_mj, 2.0);
        assert_relative_eq!(s.harvest_dry_kg, 1.2e-3);
        assert_relative_eq!(s.fresh_yield_kg, 0.02, epsilon = 1e-12);
        assert_relative_eq!(s.mean_t_air, 19.0);
        assert_eq!(s.min_t_air, 18.0);
        assert_eq!(s.max_t_air, 20.0);
    }

    #[test]
    fn test_terminal_state_falls_back_to_initial() {
        let p = ParameterSet::new();
        let initial = State::cold_start(&p, &WeatherSample::default());
        let mut t = Trajectory::new(initial);
        assert_eq!(t.terminal_state(), Some(&initial));
        t.push(step(0, 25.0));
        assert_eq!(t.terminal_state().map(|s| s.t_air), Some(25.0));
        assert!(Trajectory::empty().terminal_state().is_none());
    }

    #[test]
    fn test_extend_renumbers_steps() {
        let p = ParameterSet::new();
        let mut a = Trajectory::new(State::cold_start(&p, &WeatherSample::default()));
        a.push(step(0, 18.0));
        let mut b = Trajectory::new(a.terminal_state().copied().unwrap());
        b.push(step(0, 19.0));
        a.extend(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.steps()[1].index, 1);
    }

    #[test]
    fn test_csv_has_one_row_per_step() {
        let p = ParameterSet::new();
        let mut t = Trajectory::new(State::cold_start(&p, &WeatherSample::default()));
        t.push(step(0, 18.0));
        t.push(step(1, 20.0));
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("step,time_s,state.co2_air"));
        assert!(lines[0].contains("flux.heat.h_boil_pipe"));
        assert_eq!(
            lines[0].split(',').count(),
            Trajectory::column_names().len()
        );
        assert_eq!(lines[2].split(',').count(), Trajectory::column_names().len());
    }
}
