//! Ordered step collections
//!
//! A [`BuildStepList`] is the "Build", "Clean" or "Deploy" list of a
//! configuration. List order is execution order. Structural mutations emit
//! typed events through an optional sink, and remove/move are rejected while
//! the scheduler holds any step of the list in its queue.

use std::fmt;

use serde_json::Value;

use crate::core::events::{EngineEvent, EventSink};
use crate::core::ids::ListUid;
use crate::core::manager::BuildManager;
use crate::core::step::BuildStep;
use crate::core::store::{self, indexed_key, Store};
use crate::error::StoreError;
use crate::registry::StepRegistry;

pub(crate) const STEPS_COUNT_KEY: &str = "StepsCount";
pub(crate) const STEP_PREFIX: &str = "Step";

/// Which purpose a step list serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepListKind {
    Build,
    Clean,
    Deploy,
}

impl StepListKind {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Build => "Build",
            Self::Clean => "Clean",
            Self::Deploy => "Deploy",
        }
    }
}

impl fmt::Display for StepListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// An ordered, named collection of build steps
pub struct BuildStepList {
    uid: ListUid,
    kind: StepListKind,
    steps: Vec<Box<dyn BuildStep>>,
    events: Option<EventSink>,
}

impl BuildStepList {
    pub fn new(kind: StepListKind) -> Self {
        Self {
            uid: ListUid::fresh(),
            kind,
            steps: Vec::new(),
            events: None,
        }
    }

    pub fn uid(&self) -> ListUid {
        self.uid
    }

    pub fn kind(&self) -> StepListKind {
        self.kind
    }

    pub fn display_name(&self) -> &'static str {
        self.kind.display_name()
    }

    /// Attach the sink structural-change events go to
    pub fn set_event_sink(&mut self, events: EventSink) {
        self.events = Some(events);
    }

    pub fn count(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn at(&self, pos: usize) -> Option<&dyn BuildStep> {
        self.steps.get(pos).map(Box::as_ref)
    }

    pub fn at_mut(&mut self, pos: usize) -> Option<&mut Box<dyn BuildStep>> {
        self.steps.get_mut(pos)
    }

    pub fn steps(&self) -> impl Iterator<Item = &dyn BuildStep> {
        self.steps.iter().map(Box::as_ref)
    }

    pub fn steps_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn BuildStep>> {
        self.steps.iter_mut()
    }

    /// Insert at `pos`; false when the position is past the end
    pub fn insert_step(&mut self, pos: usize, step: Box<dyn BuildStep>) -> bool {
        if pos > self.steps.len() {
            return false;
        }
        self.steps.insert(pos, step);
        self.emit(EngineEvent::StepInserted {
            list: self.uid,
            pos,
        });
        true
    }

    /// Append a step at the end
    pub fn append_step(&mut self, step: Box<dyn BuildStep>) {
        let pos = self.steps.len();
        self.steps.push(step);
        self.emit(EngineEvent::StepInserted {
            list: self.uid,
            pos,
        });
    }

    /// Create a step of the given type and insert it at `pos`
    pub fn insert_step_by_id(
        &mut self,
        pos: usize,
        id: &str,
        registry: &StepRegistry,
    ) -> Result<bool, StoreError> {
        let step = registry.create(id)?;
        Ok(self.insert_step(pos, step))
    }

    /// Remove the step at `pos`; rejected while the list is building
    pub fn remove_step(&mut self, pos: usize, manager: &BuildManager) -> bool {
        if pos >= self.steps.len() || manager.is_building_list(self.uid) {
            return false;
        }
        self.steps.remove(pos);
        self.emit(EngineEvent::StepRemoved {
            list: self.uid,
            pos,
        });
        true
    }

    /// Swap the step at `pos` with its predecessor; rejected at position 0
    /// and while the list is building
    pub fn move_step_up(&mut self, pos: usize, manager: &BuildManager) -> bool {
        if pos == 0 || pos >= self.steps.len() || manager.is_building_list(self.uid) {
            return false;
        }
        self.steps.swap(pos - 1, pos);
        self.emit(EngineEvent::StepMoved {
            list: self.uid,
            from: pos,
            to: pos - 1,
        });
        true
    }

    /// Drop every step; restore path, emits no events
    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn to_map(&self) -> Store {
        let mut map = Store::new();
        map.insert(STEPS_COUNT_KEY.into(), Value::from(self.steps.len()));
        for (index, step) in self.steps.iter().enumerate() {
            map.insert(
                indexed_key(STEP_PREFIX, index),
                Value::Object(step.to_map()),
            );
        }
        map
    }

    /// Rebuild the list from its persisted map
    ///
    /// Steps with an unknown factory id are skipped with a warning; a count
    /// that promises more entries than the map holds is an error.
    pub fn from_map(&mut self, map: &Store, registry: &StepRegistry) -> Result<(), StoreError> {
        self.clear();
        let count = store::read_usize_or(map, STEPS_COUNT_KEY, 0)?;
        for index in 0..count {
            let key = indexed_key(STEP_PREFIX, index);
            let Ok(step_map) = store::read_map(map, &key) else {
                return Err(StoreError::InconsistentCount {
                    key: STEPS_COUNT_KEY.into(),
                    expected: count,
                    missing: key,
                });
            };
            match registry.restore(step_map) {
                Ok(step) => self.steps.push(step),
                Err(StoreError::UnknownStepId { id }) => {
                    tracing::warn!(
                        id = %id,
                        list = self.display_name(),
                        "Skipping step with unknown id during restore"
                    );
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}

impl fmt::Debug for BuildStepList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildStepList")
            .field("uid", &self.uid)
            .field("kind", &self.kind)
            .field(
                "steps",
                &self
                    .steps
                    .iter()
                    .map(|step| step.data().display_name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
