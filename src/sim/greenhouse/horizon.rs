use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

const SECONDS_PER_DAY: f64 = 86400.0;

/// Simulated time span: where it starts, how long it runs and how often the
/// controller acts and the trajectory is recorded.
///
/// Time is measured in seconds since January 1st, 00:00 of the weather year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Horizon {
    /// Start of the first step in s.
    pub start_s: f64,
    /// Length of the horizon in s.
    pub duration_s: f64,
    /// Control and recording interval in s.
    pub step_s: f64,
    /// Upper bound on the internal integration sub-step in s.
    ///
    /// `None` lets the integrator pick its own stable sub-step.
    #[serde(default)]
    pub max_substep_s: Option<f64>,
}

impl Horizon {
    pub fn new(start_s: f64, duration_s: f64, step_s: f64) -> Self {
        Self {
            start_s,
            duration_s,
            step_s,
            max_substep_s: None,
        }
    }

    /// Horizon starting at 00:00 of `first_day` (1 = January 1st).
    pub fn from_days(first_day: f64, days: f64, step_s: f64) -> Self {
        Self::new(
            (first_day - 1.0) * SECONDS_PER_DAY,
            days * SECONDS_PER_DAY,
            step_s,
        )
    }

    pub fn with_max_substep(mut self, max_substep_s: f64) -> Self {
        self.max_substep_s = Some(max_substep_s);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let fields = [
            ("start_s", self.start_s),
            ("duration_s", self.duration_s),
            ("step_s", self.step_s),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigurationError::Horizon(format!(
                "{name} must be finite (got {value})"
            )));
        }
        if self.start_s < 0.0 {
            return Err(ConfigurationError::Horizon(format!(
                "start must not be negative (got {} s)",
                self.start_s
            )));
        }
        if self.step_s <= 0.0 || self.duration_s <= 0.0 {
            return Err(ConfigurationError::Horizon(format!(
                "step ({} s) and duration ({} s) must be positive",
                self.step_s, self.duration_s
            )));
        }
        let n = self.duration_s / self.step_s;
        if (n - n.round()).abs() > 1e-6 * n.max(1.0) {
            return Err(ConfigurationError::Horizon(format!(
                "duration {} s is not a whole number of {} s steps",
                self.duration_s, self.step_s
            )));
        }
        if let Some(h) = self.max_substep_s
            && (!h.is_finite() || h <= 0.0)
        {
            return Err(ConfigurationError::Horizon(format!(
                "maximum sub-step must be positive (got {h})"
            )));
        }
        Ok(())
    }

    /// Number of control steps.
    pub fn num_steps(&self) -> usize {
        (self.duration_s / self.step_s).round() as usize
    }

    /// Start time of step `index` in s.
    pub fn time_at(&self, index: usize) -> f64 {
        self.start_s + index as f64 * self.step_s
    }

    pub fn end_s(&self) -> f64 {
        self.start_s + self.duration_s
    }

    /// The horizon that continues where this one ends.
    pub fn following(&self, duration_s: f64) -> Self {
        Self {
            start_s: self.end_s(),
            duration_s,
            ..*self
        }
    }
}

/// Hour of the day (0 to 24) at `time_s`.
pub fn hour_of_day(time_s: f64) -> f64 {
    time_s.rem_euclid(SECONDS_PER_DAY) / 3600.0
}

/// Fractional day of the year at `time_s`.
pub fn day_of_year(time_s: f64) -> f64 {
    (time_s / SECONDS_PER_DAY).rem_euclid(365.2425)
}

/// Calendar day index (0 = January 1st) containing `time_s`.
pub fn day_index(time_s: f64) -> i64 {
    (time_s / SECONDS_PER_DAY).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_days() {
        let h = Horizon::from_days(32.0, 2.0, 300.0);
        assert_eq!(h.start_s, 31.0 * 86400.0);
        assert_eq!(h.num_steps(), 576);
        assert!(h.validate().is_ok());
        assert_eq!(h.time_at(2), h.start_s + 600.0);
    }

    #[test]
    fn test_invalid_horizons() {
        assert!(Horizon::new(0.0, 1000.0, 300.0).validate().is_err());
        assert!(Horizon::new(0.0, 0.0, 300.0).validate().is_err());
        assert!(Horizon::new(-1.0, 600.0, 300.0).validate().is_err());
        assert!(Horizon::new(0.0, f64::NAN, 300.0).validate().is_err());
        assert!(
            Horizon::new(0.0, 600.0, 300.0)
                .with_max_substep(0.0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_following_segment() {
        let a = Horizon::from_days(1.0, 1.0, 300.0);
        let b = a.following(86400.0);
        assert_eq!(b.start_s, 86400.0);
        assert_eq!(b.step_s, 300.0);
    }

    #[test]
    fn test_clock_helpers() {
        assert_eq!(hour_of_day(86400.0 + 1800.0), 0.5);
        assert_eq!(day_index(86399.0), 0);
        assert_eq!(day_index(86400.0), 1);
        assert!((day_of_year(10.5 * 86400.0) - 10.5).abs() < 1e-12);
    }
}
