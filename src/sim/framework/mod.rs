//! Generic simulation framework.
//!
//! A small runtime for composing step-based simulation modules: a typed
//! message bus, the module trait and an ordered pipeline.

pub mod bus;
pub mod context;
pub mod module;
pub mod pipeline;

pub use bus::Bus;
pub use context::SimContext;
pub use module::SimModule;
pub use pipeline::Pipeline;
