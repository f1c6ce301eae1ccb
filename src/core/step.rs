//! The build step abstraction
//!
//! A [`BuildStep`] is one atomic, orderable unit of build, clean or deploy
//! work. Steps live inside a step list and go through a fixed lifecycle:
//! Idle -> Running -> one of Succeeded/Failed/Cancelled, where every
//! terminal state leaves the step ready for a future run.
//!
//! `init` runs on the control thread before anything executes and receives
//! the full context a run may need; steps cache what they keep. `run` only
//! gets a cancellation token and an event sink, so a running step never
//! reaches back into the model.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::environment::Environment;
use crate::core::events::EventSink;
use crate::core::expand::MacroExpander;
use crate::core::ids::StepUid;
use crate::core::store::{self, Store};
use crate::core::task::Task;
use crate::error::StoreError;

pub(crate) const STEP_ID_KEY: &str = "Id";
pub(crate) const DISPLAY_NAME_KEY: &str = "DisplayName";
pub(crate) const ENABLED_KEY: &str = "Enabled";

/// Lifecycle state of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl StepState {
    /// Anything but `Running`; terminal states allow a fresh run
    pub fn is_ready(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// State shared by every step implementation
#[derive(Debug, Clone)]
pub struct StepData {
    uid: StepUid,
    id: String,
    display_name: String,
    enabled: bool,
    immutable: bool,
    widget_expanded_by_default: bool,
    user_expanded: Option<bool>,
    summary_text: String,
    state: StepState,
}

impl StepData {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: StepUid::fresh(),
            id: id.into(),
            display_name: display_name.into(),
            enabled: true,
            immutable: false,
            widget_expanded_by_default: true,
            user_expanded: None,
            summary_text: String::new(),
            state: StepState::Idle,
        }
    }

    pub fn uid(&self) -> StepUid {
        self.uid
    }

    /// The factory id this step was created under
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Immutable steps cannot be removed or reordered by the user
    pub fn immutable(&self) -> bool {
        self.immutable
    }

    pub fn set_immutable(&mut self, immutable: bool) {
        self.immutable = immutable;
    }

    pub fn widget_expanded_by_default(&self) -> bool {
        self.widget_expanded_by_default
    }

    pub fn set_widget_expanded_by_default(&mut self, expanded: bool) {
        self.widget_expanded_by_default = expanded;
    }

    pub fn user_expanded(&self) -> Option<bool> {
        self.user_expanded
    }

    pub fn set_user_expanded(&mut self, expanded: Option<bool>) {
        self.user_expanded = expanded;
    }

    pub fn summary_text(&self) -> &str {
        &self.summary_text
    }

    pub fn set_summary_text(&mut self, text: impl Into<String>) {
        self.summary_text = text.into();
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn set_state(&mut self, state: StepState) {
        self.state = state;
    }

    /// Envelope keys every step persists
    pub fn to_map(&self) -> Store {
        let mut map = Store::new();
        map.insert(STEP_ID_KEY.into(), Value::String(self.id.clone()));
        map.insert(
            DISPLAY_NAME_KEY.into(),
            Value::String(self.display_name.clone()),
        );
        map.insert(ENABLED_KEY.into(), Value::Bool(self.enabled));
        map
    }

    pub fn restore_from_map(&mut self, map: &Store) -> Result<(), StoreError> {
        let display_name = store::read_str_or(map, DISPLAY_NAME_KEY, &self.display_name)?.to_string();
        let enabled = store::read_bool_or(map, ENABLED_KEY, self.enabled)?;
        self.display_name = display_name;
        self.enabled = enabled;
        Ok(())
    }
}

/// Everything `init` may hand a step to cache for its run
pub struct PreflightContext<'a> {
    /// Effective environment of the owning build configuration
    pub environment: &'a Environment,
    /// Resolved build directory of the owning build configuration
    pub build_directory: &'a Path,
    /// Macro expander assembled for the owning project/configuration
    pub expander: &'a Arc<MacroExpander>,
    /// Collector for configuration diagnostics raised during pre-flight
    pub tasks: &'a mut Vec<Task>,
}

impl<'a> PreflightContext<'a> {
    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }
}

/// What a running step gets to talk to the world
#[derive(Debug, Clone)]
pub struct StepContext {
    pub cancel: CancellationToken,
    pub events: EventSink,
}

/// One atomic unit of build/clean/deploy work
pub trait BuildStep: Send {
    fn data(&self) -> &StepData;

    fn data_mut(&mut self) -> &mut StepData;

    /// Pre-flight validation on the control thread
    ///
    /// Must succeed before `run` is invoked. A step that cannot resolve its
    /// configuration records an error task on the context and returns false.
    fn init(&mut self, ctx: &mut PreflightContext<'_>) -> bool;

    /// Execute the step; the future resolves to the success flag
    ///
    /// Cancellation is requested through the context's token; the step must
    /// still resolve the future so the scheduler can advance.
    fn run(&mut self, ctx: StepContext) -> BoxFuture<'_, bool>;

    /// One-line description shown in logs and progress displays
    fn summary(&self) -> String {
        self.data().summary_text.to_string()
    }

    fn to_map(&self) -> Store {
        self.data().to_map()
    }

    fn restore_from_map(&mut self, map: &Store) -> Result<(), StoreError> {
        self.data_mut().restore_from_map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullStep {
        data: StepData,
    }

    impl NullStep {
        fn new() -> Self {
            Self {
                data: StepData::new("buildmill.null_step", "Null"),
            }
        }
    }

    impl BuildStep for NullStep {
        fn data(&self) -> &StepData {
            &self.data
        }

        fn data_mut(&mut self) -> &mut StepData {
            &mut self.data
        }

        fn init(&mut self, _ctx: &mut PreflightContext<'_>) -> bool {
            true
        }

        fn run(&mut self, _ctx: StepContext) -> BoxFuture<'_, bool> {
            Box::pin(async move { true })
        }
    }

    #[test]
    fn test_step_data_round_trip() {
        let mut data = StepData::new("buildmill.process_step", "Make");
        data.set_enabled(false);
        let map = data.to_map();

        let mut restored = StepData::new("buildmill.process_step", "placeholder");
        restored.restore_from_map(&map).unwrap();
        assert_eq!(restored.display_name(), "Make");
        assert!(!restored.enabled());
        assert_eq!(restored.id(), "buildmill.process_step");
    }

    #[test]
    fn test_restore_keeps_current_values_for_absent_keys() {
        let mut data = StepData::new("buildmill.process_step", "Make");
        data.set_enabled(false);
        data.restore_from_map(&Store::new()).unwrap();
        assert_eq!(data.display_name(), "Make");
        assert!(!data.enabled());
    }

    #[test]
    fn test_terminal_states_are_ready_again() {
        assert!(StepState::Idle.is_ready());
        assert!(!StepState::Running.is_ready());
        assert!(StepState::Succeeded.is_ready());
        assert!(StepState::Failed.is_ready());
        assert!(StepState::Cancelled.is_ready());
    }

    #[tokio::test]
    async fn test_trait_objects_run_through_the_box() {
        let mut step: Box<dyn BuildStep> = Box::new(NullStep::new());
        let (events, _rx) = EventSink::channel();
        let ctx = StepContext {
            cancel: CancellationToken::new(),
            events,
        };
        assert!(step.run(ctx).await);
        let map = step.to_map();
        assert_eq!(
            store::read_str(&map, STEP_ID_KEY).unwrap(),
            "buildmill.null_step"
        );
    }
}
