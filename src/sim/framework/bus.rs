use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;

use anyhow::{Result, anyhow};

/// Per-step values exchanged between pipeline stages, keyed by type.
///
/// A stage publishes what it produced (weather sample, actuator positions,
/// new state) and later stages pick it up by type. Each type holds at most
/// one value, so a new step overwrites the previous one.
#[derive(Default)]
pub struct Bus {
    values: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `value`, replacing the previous value of type `T`.
    pub fn put<T: Send + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    /// Copy of a value a stage cannot run without.
    pub fn read<T: Copy + 'static>(&self) -> Result<T> {
        self.get::<T>()
            .copied()
            .ok_or_else(|| anyhow!("{} not found on Bus", short_type_name::<T>()))
    }

    /// Removes and returns the value of type `T`.
    pub fn take<T: 'static>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Type name without its module path.
fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::coupling::StepIndex;

    #[test]
    fn test_put_replaces_previous_value() {
        let mut bus = Bus::new();
        bus.put(StepIndex(0));
        bus.put(StepIndex(3));
        assert_eq!(bus.len(), 1);
        assert_eq!(bus.read::<StepIndex>().unwrap(), StepIndex(3));
        if let Some(StepIndex(i)) = bus.get_mut::<StepIndex>() {
            *i += 1;
        }
        assert_eq!(bus.get::<StepIndex>(), Some(&StepIndex(4)));
    }

    #[test]
    fn test_missing_value_names_the_type() {
        let bus = Bus::new();
        let err = bus.read::<StepIndex>().unwrap_err();
        assert_eq!(err.to_string(), "StepIndex not found on Bus");
    }

    #[test]
    fn test_take_removes() {
        let mut bus = Bus::new();
        bus.put(vec![1.0_f64, 2.0]);
        assert!(bus.contains::<Vec<f64>>());
        assert_eq!(bus.take::<Vec<f64>>(), Some(vec![1.0, 2.0]));
        assert!(bus.take::<Vec<f64>>().is_none());
        assert!(bus.is_empty());
    }
}
