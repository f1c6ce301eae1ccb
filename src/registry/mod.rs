//! Step factory registry
//!
//! Concrete step types register a factory under a stable id. Step lists
//! create new steps through the registry and restores resolve the persisted
//! id back to a factory; an id nobody registered is reported, not guessed.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::process_step::{ProcessStep, PROCESS_STEP_ID};
use crate::core::step::{BuildStep, STEP_ID_KEY};
use crate::core::store::{self, Store};
use crate::error::StoreError;

type StepFactory = Box<dyn Fn() -> Box<dyn BuildStep> + Send + Sync>;

struct RegisteredFactory {
    display_name: String,
    factory: StepFactory,
}

/// Factories for every known step type, keyed by stable id
#[derive(Default)]
pub struct StepRegistry {
    factories: BTreeMap<String, RegisteredFactory>,
}

impl StepRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in step types registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PROCESS_STEP_ID, "Custom Process Step", || {
            Box::new(ProcessStep::new())
        });
        registry
    }

    /// Register a factory; a second registration under the same id replaces
    /// the first
    pub fn register<F>(&mut self, id: impl Into<String>, display_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn BuildStep> + Send + Sync + 'static,
    {
        self.factories.insert(
            id.into(),
            RegisteredFactory {
                display_name: display_name.into(),
                factory: Box::new(factory),
            },
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn display_name(&self, id: &str) -> Option<&str> {
        self.factories
            .get(id)
            .map(|entry| entry.display_name.as_str())
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create a fresh step of the given type
    pub fn create(&self, id: &str) -> Result<Box<dyn BuildStep>, StoreError> {
        let entry = self
            .factories
            .get(id)
            .ok_or_else(|| StoreError::UnknownStepId { id: id.to_string() })?;
        Ok((entry.factory)())
    }

    /// Recreate a step from its persisted map
    pub fn restore(&self, map: &Store) -> Result<Box<dyn BuildStep>, StoreError> {
        let id = store::read_str(map, STEP_ID_KEY)?;
        let mut step = self.create(id)?;
        step.restore_from_map(map)?;
        Ok(step)
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("ids", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
