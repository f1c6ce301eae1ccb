//! Build, deploy and run configurations
//!
//! A [`BuildConfiguration`] owns the Build and Clean step lists, a build
//! directory and an environment assembled from a system-or-clean base plus
//! ordered user deltas. The effective environment is cached; recomputing it
//! emits `EnvironmentChanged` only when the value actually changed.
//! [`DeployConfiguration`] owns the single Deploy list,
//! [`RunConfiguration`] is carried for active-selection bookkeeping only.

use serde_json::Value;

use crate::core::environment::{Environment, EnvironmentItem};
use crate::core::events::{EngineEvent, EventSink};
use crate::core::expand::MacroExpander;
use crate::core::ids::ConfigUid;
use crate::core::steplist::{BuildStepList, StepListKind};
use crate::core::store::{self, indexed_key, Store};
use crate::error::StoreError;
use crate::registry::StepRegistry;

/// Stable id written into every build configuration map
pub const BUILD_CONFIGURATION_ID: &str = "buildmill.build_configuration";
/// Stable id written into every deploy configuration map
pub const DEPLOY_CONFIGURATION_ID: &str = "buildmill.deploy_configuration";
/// Stable id written into every run configuration map
pub const RUN_CONFIGURATION_ID: &str = "buildmill.run_configuration";

const ID_KEY: &str = "Id";
const DISPLAY_NAME_KEY: &str = "DisplayName";
const BUILD_DIRECTORY_KEY: &str = "BuildDirectory";
const BUILD_STEP_LIST_COUNT_KEY: &str = "BuildStepListCount";
const BUILD_STEP_LIST_PREFIX: &str = "BuildStepList";
const CLEAR_SYSTEM_ENVIRONMENT_KEY: &str = "ClearSystemEnvironment";
const USER_ENVIRONMENT_CHANGES_KEY: &str = "UserEnvironmentChanges";
const PARSE_STANDARD_OUTPUT_KEY: &str = "ParseStandardOutput";
const CUSTOM_PARSERS_KEY: &str = "CustomParsers";

/// A named way of building one target
#[derive(Debug)]
pub struct BuildConfiguration {
    uid: ConfigUid,
    display_name: String,
    build_directory: String,
    clear_system_environment: bool,
    user_environment_changes: Vec<EnvironmentItem>,
    parse_standard_output: bool,
    custom_parsers: Vec<String>,
    build_steps: BuildStepList,
    clean_steps: BuildStepList,
    effective_environment: Environment,
    events: Option<EventSink>,
}

impl BuildConfiguration {
    pub fn new(display_name: impl Into<String>, build_directory: impl Into<String>) -> Self {
        let mut config = Self {
            uid: ConfigUid::fresh(),
            display_name: display_name.into(),
            build_directory: build_directory.into(),
            clear_system_environment: false,
            user_environment_changes: Vec::new(),
            parse_standard_output: false,
            custom_parsers: Vec::new(),
            build_steps: BuildStepList::new(StepListKind::Build),
            clean_steps: BuildStepList::new(StepListKind::Clean),
            effective_environment: Environment::new(),
            events: None,
        };
        config.effective_environment = config.compute_environment();
        config
    }

    pub fn uid(&self) -> ConfigUid {
        self.uid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }

    /// Raw build directory, still subject to macro expansion
    pub fn build_directory(&self) -> &str {
        &self.build_directory
    }

    pub fn set_build_directory(&mut self, directory: impl Into<String>) {
        self.build_directory = directory.into();
    }

    pub fn set_event_sink(&mut self, events: EventSink) {
        self.build_steps.set_event_sink(events.clone());
        self.clean_steps.set_event_sink(events.clone());
        self.events = Some(events);
    }

    pub fn clear_system_environment(&self) -> bool {
        self.clear_system_environment
    }

    pub fn set_clear_system_environment(&mut self, clear: bool) {
        self.clear_system_environment = clear;
        self.refresh_environment();
    }

    pub fn user_environment_changes(&self) -> &[EnvironmentItem] {
        &self.user_environment_changes
    }

    pub fn set_user_environment_changes(&mut self, changes: Vec<EnvironmentItem>) {
        self.user_environment_changes = changes;
        self.refresh_environment();
    }

    pub fn parse_standard_output(&self) -> bool {
        self.parse_standard_output
    }

    pub fn set_parse_standard_output(&mut self, parse: bool) {
        self.parse_standard_output = parse;
    }

    pub fn custom_parsers(&self) -> &[String] {
        &self.custom_parsers
    }

    pub fn set_custom_parsers(&mut self, parsers: Vec<String>) {
        self.custom_parsers = parsers;
    }

    /// The cached effective environment steps run under
    pub fn environment(&self) -> &Environment {
        &self.effective_environment
    }

    pub fn build_steps(&self) -> &BuildStepList {
        &self.build_steps
    }

    pub fn build_steps_mut(&mut self) -> &mut BuildStepList {
        &mut self.build_steps
    }

    pub fn clean_steps(&self) -> &BuildStepList {
        &self.clean_steps
    }

    pub fn clean_steps_mut(&mut self) -> &mut BuildStepList {
        &mut self.clean_steps
    }

    /// The list serving `kind`, if this configuration has one
    pub fn list(&self, kind: StepListKind) -> Option<&BuildStepList> {
        match kind {
            StepListKind::Build => Some(&self.build_steps),
            StepListKind::Clean => Some(&self.clean_steps),
            StepListKind::Deploy => None,
        }
    }

    pub fn list_mut(&mut self, kind: StepListKind) -> Option<&mut BuildStepList> {
        match kind {
            StepListKind::Build => Some(&mut self.build_steps),
            StepListKind::Clean => Some(&mut self.clean_steps),
            StepListKind::Deploy => None,
        }
    }

    /// Split mutable access to both lists at once, used by the workspace
    /// tree walks
    pub(crate) fn lists_mut(&mut self) -> (&mut BuildStepList, &mut BuildStepList) {
        (&mut self.build_steps, &mut self.clean_steps)
    }

    /// Expander for the macros this configuration contributes
    pub fn macro_expander(&self, project_name: &str, source_directory: &str) -> MacroExpander {
        let mut expander = MacroExpander::new();
        expander.register_value("Project:Name", project_name);
        expander.register_value("sourceDir", source_directory);
        expander.register_value("buildDir", &self.build_directory);
        expander.register_value("BuildConfig:Name", &self.display_name);
        expander
    }

    fn base_environment(&self) -> Environment {
        if self.clear_system_environment {
            Environment::new()
        } else {
            Environment::system()
        }
    }

    /// The user deltas applied over a caller-provided base
    ///
    /// The scheduler uses this at admission time so a build system can
    /// contribute its own base environment; `ClearSystemEnvironment` still
    /// wins and starts from nothing.
    pub fn environment_with_base(&self, base: Environment) -> Environment {
        let mut environment = if self.clear_system_environment {
            Environment::new()
        } else {
            base
        };
        environment.apply_items(&self.user_environment_changes);
        environment
    }

    fn compute_environment(&self) -> Environment {
        let mut environment = self.base_environment();
        environment.apply_items(&self.user_environment_changes);
        environment
    }

    /// Recompute the cache; emits only on an actual change
    pub fn refresh_environment(&mut self) {
        let environment = self.compute_environment();
        if environment != self.effective_environment {
            self.effective_environment = environment;
            if let Some(events) = &self.events {
                events.send(EngineEvent::EnvironmentChanged { config: self.uid });
            }
        }
    }

    pub fn to_map(&self) -> Store {
        let mut map = Store::new();
        map.insert(ID_KEY.into(), Value::String(BUILD_CONFIGURATION_ID.into()));
        map.insert(
            DISPLAY_NAME_KEY.into(),
            Value::String(self.display_name.clone()),
        );
        map.insert(
            BUILD_DIRECTORY_KEY.into(),
            Value::String(self.build_directory.clone()),
        );
        map.insert(BUILD_STEP_LIST_COUNT_KEY.into(), Value::from(2));
        map.insert(
            indexed_key(BUILD_STEP_LIST_PREFIX, 0),
            Value::Object(self.build_steps.to_map()),
        );
        map.insert(
            indexed_key(BUILD_STEP_LIST_PREFIX, 1),
            Value::Object(self.clean_steps.to_map()),
        );
        map.insert(
            CLEAR_SYSTEM_ENVIRONMENT_KEY.into(),
            Value::Bool(self.clear_system_environment),
        );
        map.insert(
            USER_ENVIRONMENT_CHANGES_KEY.into(),
            Value::Array(
                self.user_environment_changes
                    .iter()
                    .map(|item| Value::String(item.to_setting()))
                    .collect(),
            ),
        );
        map.insert(
            PARSE_STANDARD_OUTPUT_KEY.into(),
            Value::Bool(self.parse_standard_output),
        );
        map.insert(
            CUSTOM_PARSERS_KEY.into(),
            Value::Array(
                self.custom_parsers
                    .iter()
                    .map(|parser| Value::String(parser.clone()))
                    .collect(),
            ),
        );
        map
    }

    pub fn from_map(&mut self, map: &Store, registry: &StepRegistry) -> Result<(), StoreError> {
        self.display_name = store::read_str_or(map, DISPLAY_NAME_KEY, &self.display_name)?.to_string();
        self.build_directory =
            store::read_str_or(map, BUILD_DIRECTORY_KEY, &self.build_directory)?.to_string();

        let count = store::read_usize_or(map, BUILD_STEP_LIST_COUNT_KEY, 0)?;
        if count != 2 {
            return Err(StoreError::WrongType {
                key: BUILD_STEP_LIST_COUNT_KEY.into(),
                expected: "exactly two step lists",
            });
        }
        self.build_steps
            .from_map(store::read_map(map, &indexed_key(BUILD_STEP_LIST_PREFIX, 0))?, registry)?;
        self.clean_steps
            .from_map(store::read_map(map, &indexed_key(BUILD_STEP_LIST_PREFIX, 1))?, registry)?;

        self.clear_system_environment =
            store::read_bool_or(map, CLEAR_SYSTEM_ENVIRONMENT_KEY, false)?;
        self.user_environment_changes = store::read_string_list_or_default(map, USER_ENVIRONMENT_CHANGES_KEY)?
            .iter()
            .filter_map(|setting| {
                let item = EnvironmentItem::from_setting(setting);
                if item.is_none() {
                    tracing::warn!(setting = %setting, "Skipping unparsable environment change");
                }
                item
            })
            .collect();
        self.parse_standard_output = store::read_bool_or(map, PARSE_STANDARD_OUTPUT_KEY, false)?;
        self.custom_parsers = store::read_string_list_or_default(map, CUSTOM_PARSERS_KEY)?;
        self.refresh_environment();
        Ok(())
    }
}

/// A named way of deploying one target
#[derive(Debug)]
pub struct DeployConfiguration {
    uid: ConfigUid,
    display_name: String,
    deploy_steps: BuildStepList,
}

impl DeployConfiguration {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            uid: ConfigUid::fresh(),
            display_name: display_name.into(),
            deploy_steps: BuildStepList::new(StepListKind::Deploy),
        }
    }

    pub fn uid(&self) -> ConfigUid {
        self.uid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }

    pub fn set_event_sink(&mut self, events: EventSink) {
        self.deploy_steps.set_event_sink(events);
    }

    pub fn deploy_steps(&self) -> &BuildStepList {
        &self.deploy_steps
    }

    pub fn deploy_steps_mut(&mut self) -> &mut BuildStepList {
        &mut self.deploy_steps
    }

    pub fn to_map(&self) -> Store {
        let mut map = Store::new();
        map.insert(ID_KEY.into(), Value::String(DEPLOY_CONFIGURATION_ID.into()));
        map.insert(
            DISPLAY_NAME_KEY.into(),
            Value::String(self.display_name.clone()),
        );
        map.insert(BUILD_STEP_LIST_COUNT_KEY.into(), Value::from(1));
        map.insert(
            indexed_key(BUILD_STEP_LIST_PREFIX, 0),
            Value::Object(self.deploy_steps.to_map()),
        );
        map
    }

    pub fn from_map(&mut self, map: &Store, registry: &StepRegistry) -> Result<(), StoreError> {
        self.display_name = store::read_str_or(map, DISPLAY_NAME_KEY, &self.display_name)?.to_string();
        let count = store::read_usize_or(map, BUILD_STEP_LIST_COUNT_KEY, 0)?;
        if count != 1 {
            return Err(StoreError::WrongType {
                key: BUILD_STEP_LIST_COUNT_KEY.into(),
                expected: "exactly one step list",
            });
        }
        self.deploy_steps
            .from_map(store::read_map(map, &indexed_key(BUILD_STEP_LIST_PREFIX, 0))?, registry)?;
        Ok(())
    }
}

/// Carried for active-selection bookkeeping; execution is out of scope
#[derive(Debug)]
pub struct RunConfiguration {
    uid: ConfigUid,
    display_name: String,
}

impl RunConfiguration {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            uid: ConfigUid::fresh(),
            display_name: display_name.into(),
        }
    }

    pub fn uid(&self) -> ConfigUid {
        self.uid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }

    pub fn to_map(&self) -> Store {
        let mut map = Store::new();
        map.insert(ID_KEY.into(), Value::String(RUN_CONFIGURATION_ID.into()));
        map.insert(
            DISPLAY_NAME_KEY.into(),
            Value::String(self.display_name.clone()),
        );
        map
    }

    pub fn from_map(&mut self, map: &Store) -> Result<(), StoreError> {
        self.display_name = store::read_str_or(map, DISPLAY_NAME_KEY, &self.display_name)?.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::process_step::ProcessStep;
    use crate::core::step::BuildStep;

    fn clean_config() -> BuildConfiguration {
        let mut config = BuildConfiguration::new("Debug", "build/debug");
        config.set_clear_system_environment(true);
        config
    }

    #[test]
    fn test_environment_applies_user_deltas_in_order() {
        let mut config = clean_config();
        config.set_user_environment_changes(vec![
            EnvironmentItem::set("PATH", "/usr/bin"),
            EnvironmentItem::prepend("PATH", "/opt/bin"),
            EnvironmentItem::set("CC", "clang"),
        ]);
        assert_eq!(config.environment().get("PATH"), Some("/opt/bin:/usr/bin"));
        assert_eq!(config.environment().get("CC"), Some("clang"));
    }

    #[test]
    fn test_environment_changed_fires_only_on_actual_change() {
        let (sink, mut rx) = EventSink::channel();
        let mut config = clean_config();
        config.set_event_sink(sink);
        while rx.try_recv().is_ok() {}

        config.set_user_environment_changes(vec![EnvironmentItem::set("CC", "gcc")]);
        assert!(matches!(
            rx.try_recv(),
            Ok(EngineEvent::EnvironmentChanged { config: uid }) if uid == config.uid()
        ));

        // Same deltas again resolve to the same environment.
        config.set_user_environment_changes(vec![EnvironmentItem::set("CC", "gcc")]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_round_trip_preserves_lists_and_settings() {
        let registry = StepRegistry::with_builtins();
        let mut config = clean_config();
        let mut compile = ProcessStep::new();
        compile.data_mut().set_display_name("Compile");
        compile.set_command("make");
        config.build_steps_mut().append_step(Box::new(compile));
        let mut scrub = ProcessStep::new();
        scrub.data_mut().set_display_name("Scrub");
        scrub.set_command("make");
        scrub.set_arguments("clean");
        config.clean_steps_mut().append_step(Box::new(scrub));
        config.set_user_environment_changes(vec![
            EnvironmentItem::set("CC", "gcc"),
            EnvironmentItem::unset("CFLAGS"),
        ]);
        config.set_parse_standard_output(true);
        config.set_custom_parsers(vec!["gcc".to_string()]);

        let map = config.to_map();
        let mut restored = BuildConfiguration::new("placeholder", "");
        restored.from_map(&map, &registry).unwrap();

        assert_eq!(restored.display_name(), "Debug");
        assert_eq!(restored.build_directory(), "build/debug");
        assert_eq!(restored.build_steps().count(), 1);
        assert_eq!(restored.clean_steps().count(), 1);
        assert!(restored.clear_system_environment());
        assert_eq!(restored.user_environment_changes().len(), 2);
        assert!(restored.parse_standard_output());
        assert_eq!(restored.custom_parsers(), ["gcc".to_string()]);
        assert_eq!(restored.environment().get("CC"), Some("gcc"));
    }

    #[test]
    fn test_wrong_list_count_fails_the_restore() {
        let registry = StepRegistry::with_builtins();
        let mut map = clean_config().to_map();
        map.insert(BUILD_STEP_LIST_COUNT_KEY.into(), Value::from(1));
        let mut restored = BuildConfiguration::new("x", "");
        assert!(restored.from_map(&map, &registry).is_err());
    }

    #[test]
    fn test_unparsable_environment_changes_are_skipped() {
        let registry = StepRegistry::with_builtins();
        let mut map = clean_config().to_map();
        map.insert(
            USER_ENVIRONMENT_CHANGES_KEY.into(),
            Value::Array(vec![
                Value::String("CC=gcc".into()),
                Value::String("=broken".into()),
            ]),
        );
        let mut restored = BuildConfiguration::new("x", "");
        restored.from_map(&map, &registry).unwrap();
        assert_eq!(restored.user_environment_changes().len(), 1);
    }

    #[test]
    fn test_macro_expander_exposes_configuration_values() {
        let config = BuildConfiguration::new("Release", "build/release");
        let expander = config.macro_expander("frontend", "/src/frontend");
        assert_eq!(
            expander.expand("%{Project:Name} in %{buildDir} from %{sourceDir}"),
            "frontend in build/release from /src/frontend"
        );
        assert_eq!(expander.expand("%{BuildConfig:Name}"), "Release");
    }

    #[test]
    fn test_deploy_round_trip_is_strict_about_its_list() {
        let registry = StepRegistry::with_builtins();
        let mut deploy = DeployConfiguration::new("Deploy to staging");
        let mut push = ProcessStep::new();
        push.data_mut().set_display_name("Push");
        push.set_command("rsync");
        deploy.deploy_steps_mut().append_step(Box::new(push));

        let map = deploy.to_map();
        let mut restored = DeployConfiguration::new("placeholder");
        restored.from_map(&map, &registry).unwrap();
        assert_eq!(restored.display_name(), "Deploy to staging");
        assert_eq!(restored.deploy_steps().count(), 1);

        let mut broken = map.clone();
        broken.insert(BUILD_STEP_LIST_COUNT_KEY.into(), Value::from(0));
        let mut failed = DeployConfiguration::new("placeholder");
        assert!(failed.from_map(&broken, &registry).is_err());
    }
}
