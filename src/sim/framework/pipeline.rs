use anyhow::{Context, Result};

use super::{Bus, SimContext, SimModule};

/// Ordered stages executed once per control step.
///
/// Errors are wrapped with the name of the failing stage. The typed error
/// underneath stays reachable through `anyhow::Error::downcast_ref`.
pub struct Pipeline {
    modules: Vec<Box<dyn SimModule>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { modules: vec![] }
    }

    /// Appends a stage. Stages run in insertion order.
    pub fn with_module<M: SimModule + 'static>(mut self, module: M) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn init(&mut self, ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        for module in self.modules.iter_mut() {
            let name = module.name();
            module
                .init(ctx, bus)
                .with_context(|| format!("stage `{name}` failed to initialize"))?;
        }
        Ok(())
    }

    pub fn step(&mut self, ctx: &SimContext, bus: &mut Bus) -> Result<()> {
        for module in self.modules.iter_mut() {
            let name = module.name();
            module
                .step(ctx, bus)
                .with_context(|| format!("stage `{name}` failed"))?;
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
