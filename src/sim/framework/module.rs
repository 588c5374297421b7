use anyhow::Result;

use super::{Bus, SimContext};

/// One stage of a step-based simulation.
///
/// Stages of a greenhouse run are weather, control, envelope, climate and
/// recorder. They see the run-wide [`SimContext`] and exchange per-step
/// values only through the [`Bus`].
pub trait SimModule: Send {
    /// Stage name used in error messages and logs.
    fn name(&self) -> &'static str;

    /// Called once before the first step, after the initial state is on the Bus.
    fn init(&mut self, _ctx: &SimContext, _bus: &mut Bus) -> Result<()> {
        Ok(())
    }

    /// Runs the stage for the current step.
    fn step(&mut self, ctx: &SimContext, bus: &mut Bus) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::greenhouse::horizon::Horizon;
    use crate::sim::greenhouse::params::ParameterSet;

    /// Publishes the start time of each step.
    struct Clock {
        index: usize,
    }

    impl SimModule for Clock {
        fn name(&self) -> &'static str {
            "clock"
        }

        fn step(&mut self, ctx: &SimContext, bus: &mut Bus) -> Result<()> {
            bus.put(ctx.horizon.time_at(self.index));
            self.index += 1;
            Ok(())
        }
    }

    #[test]
    fn test_stage_reads_the_context() {
        let params = ParameterSet::new();
        let horizon = Horizon::from_days(2.0, 1.0, 300.0);
        let ctx = SimContext::new(&params, &horizon);

        let mut bus = Bus::new();
        let mut m = Clock { index: 0 };
        m.init(&ctx, &mut bus).unwrap();
        assert!(bus.is_empty());
        m.step(&ctx, &mut bus).unwrap();
        m.step(&ctx, &mut bus).unwrap();
        assert_eq!(bus.get::<f64>(), Some(&(86400.0 + 300.0)));
    }
}
