use crate::sim::greenhouse::horizon::Horizon;
use crate::sim::greenhouse::params::ParameterSet;

/// Shared read-only context passed to simulation modules.
///
/// Holds what stays fixed for a whole run. Per-step values (weather sample,
/// actuator positions, state) travel on the [`super::Bus`].
pub struct SimContext<'a> {
    pub params: &'a ParameterSet,
    pub horizon: &'a Horizon,
}

impl<'a> SimContext<'a> {
    pub fn new(params: &'a ParameterSet, horizon: &'a Horizon) -> Self {
        Self { params, horizon }
    }
}
