//! Run configuration files.
//!
//! A run file selects a preset greenhouse, the lamps, the initial condition,
//! the weather source and the horizon, and may override any parameter:
//!
//! ```toml
//! greenhouse = "venlo"
//! lamps = "hps"
//! initial = "mature"
//!
//! [horizon]
//! first_day = 280
//! days = 7
//! step_s = 300
//!
//! [weather]
//! source = "epw"
//! path = "weather/amsterdam.epw"
//!
//! [parameters.control]
//! t_sp_night = 17.0
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::geometry::GreenhouseShape;
use super::horizon::Horizon;
use super::params::{LampType, ParameterSet};
use super::simulation::Simulation;
use super::state::State;
use super::weather::{ArtificialWeather, HourlyWeather, WeatherData, WeatherProvider, WeatherSample};
use crate::error::ConfigurationError;

/// Greenhouse parameter presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GreenhousePreset {
    /// Dutch Venlo greenhouse of 1.4 ha.
    #[default]
    Venlo,
    /// Modern 4 ha greenhouse used for world-wide climate comparisons.
    WorldComparison,
}

impl GreenhousePreset {
    pub fn parameters(self) -> ParameterSet {
        match self {
            Self::Venlo => ParameterSet::new(),
            Self::WorldComparison => ParameterSet::world_comparison_4ha(),
        }
    }
}

/// Initial condition of the run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialCondition {
    /// Climate at the night setpoint and a freshly planted crop.
    #[default]
    Cold,
    /// Same climate with a fully developed crop.
    Mature,
    /// Resume token written by a previous run.
    Resume { path: PathBuf },
}

/// Where outdoor conditions come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum WeatherSource {
    /// Smooth daily sine cycle.
    Artificial,
    /// Generated typical year.
    Synthetic {
        #[serde(default = "default_mean_temperature")]
        mean_temperature: f64,
        #[serde(default = "default_temperature_amplitude")]
        amplitude: f64,
    },
    /// EnergyPlus weather file.
    Epw { path: PathBuf },
}

fn default_mean_temperature() -> f64 {
    10.0
}

fn default_temperature_amplitude() -> f64 {
    8.0
}

impl Default for WeatherSource {
    fn default() -> Self {
        Self::Artificial
    }
}

impl WeatherSource {
    /// Builds the provider. Relative paths resolve against `base_dir`.
    pub fn provider(&self, base_dir: &Path) -> Result<Arc<dyn WeatherProvider>> {
        Ok(match self {
            Self::Artificial => Arc::new(ArtificialWeather),
            Self::Synthetic {
                mean_temperature,
                amplitude,
            } => Arc::new(HourlyWeather::new(Arc::new(WeatherData::synthetic(
                "synthetic",
                52.0,
                4.9,
                *mean_temperature,
                *amplitude,
            )))),
            Self::Epw { path } => {
                let path = base_dir.join(path);
                let data = WeatherData::from_epw_file(&path)?;
                Arc::new(HourlyWeather::new(Arc::new(data)))
            }
        })
    }
}

/// Horizon in calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// Day of the year the run starts, 1 = January 1st.
    pub first_day: f64,
    pub days: f64,
    pub step_s: f64,
    pub max_substep_s: Option<f64>,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            first_day: 1.0,
            days: 1.0,
            step_s: 300.0,
            max_substep_s: None,
        }
    }
}

impl HorizonConfig {
    pub fn horizon(&self) -> Horizon {
        let h = Horizon::from_days(self.first_day, self.days, self.step_s);
        match self.max_substep_s {
            Some(dt) => h.with_max_substep(dt),
            None => h,
        }
    }
}

/// Contents of a run file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub greenhouse: GreenhousePreset,
    pub lamps: LampType,
    pub initial: InitialCondition,
    pub horizon: HorizonConfig,
    pub weather: WeatherSource,
    /// Optional house geometry replacing the preset construction.
    pub geometry: Option<GreenhouseShape>,
    /// Parameter overrides, laid out like [`ParameterSet`].
    pub parameters: Option<toml::Table>,
}

impl RunConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid run configuration TOML")
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read run configuration {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid run configuration {}", path.display()))
    }

    /// Preset, lamps, geometry and overrides, validated.
    pub fn parameters(&self) -> Result<ParameterSet> {
        let mut params = self.greenhouse.parameters().with_lamps(self.lamps);
        if let Some(shape) = &self.geometry {
            params = params.with_geometry(&shape.fragment()?)?;
        }
        if let Some(overrides) = &self.parameters {
            let mut merged = toml::Value::try_from(&params)
                .context("Failed to serialize parameters for merging")?;
            let Some(base) = merged.as_table_mut() else {
                anyhow::bail!("parameters did not serialize to a table");
            };
            merge_tables(base, overrides, "parameters")?;
            params = merged
                .try_into()
                .map_err(|e| ConfigurationError::File(format!("parameter overrides: {e}")))?;
        }
        params.validate()?;
        Ok(params)
    }

    /// Initial state, or `None` for the cold-start defaults.
    ///
    /// `first` is the weather of the first step, used for the mature preset.
    pub fn initial_state(
        &self,
        params: &ParameterSet,
        first: &WeatherSample,
        base_dir: &Path,
    ) -> Result<Option<State>> {
        Ok(match &self.initial {
            InitialCondition::Cold => None,
            InitialCondition::Mature => Some(State::mature(params, first)),
            InitialCondition::Resume { path } => {
                let path = base_dir.join(path);
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read resume token {}", path.display()))?;
                Some(State::from_json(&content)?)
            }
        })
    }

    /// Ready-to-run simulation with the rule-based controller.
    pub fn simulation(&self, base_dir: &Path) -> Result<Simulation> {
        let params = self.parameters()?;
        let horizon = self.horizon.horizon();
        horizon.validate()?;
        let weather = self.weather.provider(base_dir)?;
        let first = weather
            .reading(horizon.start_s)
            .with_context(|| format!("Weather source `{}` failed", weather.name()))?;
        let initial = self.initial_state(&params, &first, base_dir)?;

        let mut sim = Simulation::new(Arc::new(params), horizon, weather);
        if let Some(state) = initial {
            sim = sim.with_initial_state(state);
        }
        Ok(sim)
    }
}

/// Overwrites entries of `base` with `overrides`, recursing into tables.
///
/// Keys missing from `base` are rejected so that typos do not pass silently.
fn merge_tables(
    base: &mut toml::Table,
    overrides: &toml::Table,
    path: &str,
) -> Result<(), ConfigurationError> {
    for (key, value) in overrides {
        let name = format!("{path}.{key}");
        let Some(slot) = base.get_mut(key) else {
            return Err(ConfigurationError::File(format!("unknown parameter `{name}`")));
        };
        match (slot, value) {
            (toml::Value::Table(b), toml::Value::Table(o)) => merge_tables(b, o, &name)?,
            (slot, toml::Value::Integer(i)) if slot.is_float() => {
                *slot = toml::Value::Float(*i as f64)
            }
            (slot, value) => *slot = value.clone(),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::greenhouse::geometry::RoofArchetype;

    #[test]
    fn test_defaults_from_empty_file() {
        let cfg = RunConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, RunConfig::default());
        assert_eq!(cfg.parameters().unwrap(), ParameterSet::new());
        assert_eq!(cfg.horizon.horizon().num_steps(), 288);
    }

    #[test]
    fn test_presets_and_overrides() {
        let cfg = RunConfig::from_toml_str(
            r#"
            greenhouse = "world_comparison"
            lamps = "led"
            initial = "mature"

            [horizon]
            first_day = 280
            days = 2
            step_s = 600

            [weather]
            source = "synthetic"
            mean_temperature = 12.0

            [parameters.control]
            t_sp_night = 17
            rh_max = 85.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.initial, InitialCondition::Mature);
        assert_eq!(
            cfg.weather,
            WeatherSource::Synthetic {
                mean_temperature: 12.0,
                amplitude: 8.0
            }
        );
        let p = cfg.parameters().unwrap();
        assert_eq!(p.construction.floor_area, 4e4);
        assert_eq!(p.lamps, ParameterSet::new().with_lamps(LampType::Led).lamps);
        assert_eq!(p.control.t_sp_night, 17.0);
        assert_eq!(p.control.rh_max, 85.5);
        let h = cfg.horizon.horizon();
        assert_eq!(h.start_s, 279.0 * 86400.0);
        assert_eq!(h.num_steps(), 288);
    }

    #[test]
    fn test_unknown_override_is_rejected() {
        let cfg = RunConfig::from_toml_str(
            r#"
            [parameters.control]
            t_sp_nigth = 17.0
            "#,
        )
        .unwrap();
        let err = cfg.parameters().unwrap_err();
        let e = err.downcast_ref::<ConfigurationError>().unwrap();
        assert!(matches!(e, ConfigurationError::File(msg) if msg.contains("t_sp_nigth")));
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let cfg = RunConfig::from_toml_str(
            r#"
            [parameters.construction]
            floor_area = -5.0
            "#,
        )
        .unwrap();
        let err = cfg.parameters().unwrap_err();
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
    }

    #[test]
    fn test_geometry_section() {
        let cfg = RunConfig::from_toml_str(
            r#"
            [geometry]
            archetype = "gothic-arch"
            span_width = 8.0
            bay_length = 5.0
            wall_height = 5.5
            slope_deg = 25.0
            spans = 10
            bays = 20
            "#,
        )
        .unwrap();
        assert_eq!(cfg.geometry.map(|g| g.archetype), Some(RoofArchetype::GothicArch));
        let p = cfg.parameters().unwrap();
        assert_eq!(p.construction.floor_area, 8000.0);
    }

    #[test]
    fn test_artificial_weather_provider() {
        let cfg = RunConfig::default();
        let w = cfg.weather.provider(Path::new(".")).unwrap();
        assert_eq!(w.name(), "artificial");
        let p = cfg.parameters().unwrap();
        let first = w.reading(0.0).unwrap();
        assert!(cfg.initial_state(&p, &first, Path::new(".")).unwrap().is_none());
    }

    #[test]
    fn test_mature_simulation_from_file() {
        let cfg = RunConfig::from_toml_str(
            r#"
            initial = "mature"

            [horizon]
            first_day = 10
            days = 0.0125
            step_s = 360
            "#,
        )
        .unwrap();
        let out = cfg.simulation(Path::new(".")).unwrap().run().unwrap();
        assert_eq!(out.trajectory.len(), 3);
        assert_eq!(out.trajectory.initial_state().unwrap().c_fruit, 2.8e5);
    }

    #[test]
    fn test_missing_epw_file_is_reported() {
        let cfg = RunConfig::from_toml_str(
            r#"
            [weather]
            source = "epw"
            path = "does/not/exist.epw"
            "#,
        )
        .unwrap();
        assert!(cfg.simulation(Path::new("/nonexistent")).is_err());
    }
}
