//! Targets and active-configuration tracking
//!
//! A [`Target`] pairs a project with one kit and owns that kit's build,
//! deploy and run configurations. At most one configuration of each kind is
//! active; whenever a collection is non-empty exactly one of its members is.
//! Activating a configuration that the target does not own is a no-op.

use serde_json::Value;

use crate::core::configuration::{BuildConfiguration, DeployConfiguration, RunConfiguration};
use crate::core::events::{EngineEvent, EventSink};
use crate::core::ids::{ConfigUid, TargetUid};
use crate::core::manager::BuildManager;
use crate::core::store::{self, indexed_key, Store};
use crate::error::StoreError;
use crate::registry::StepRegistry;

const KIT_KEY: &str = "Kit";
const BUILD_CONFIGURATION_COUNT_KEY: &str = "BuildConfigurationCount";
const BUILD_CONFIGURATION_PREFIX: &str = "BuildConfiguration";
const ACTIVE_BUILD_CONFIGURATION_KEY: &str = "ActiveBuildConfiguration";
const DEPLOY_CONFIGURATION_COUNT_KEY: &str = "DeployConfigurationCount";
const DEPLOY_CONFIGURATION_PREFIX: &str = "DeployConfiguration";
const ACTIVE_DEPLOY_CONFIGURATION_KEY: &str = "ActiveDeployConfiguration";
const RUN_CONFIGURATION_COUNT_KEY: &str = "RunConfigurationCount";
const RUN_CONFIGURATION_PREFIX: &str = "RunConfiguration";
const ACTIVE_RUN_CONFIGURATION_KEY: &str = "ActiveRunConfiguration";

/// Whether activating something also fixes up dependent selections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetActive {
    Cascade,
    NoCascade,
}

/// The pairing of a project with one kit
#[derive(Debug)]
pub struct Target {
    uid: TargetUid,
    kit: String,
    build_configurations: Vec<BuildConfiguration>,
    deploy_configurations: Vec<DeployConfiguration>,
    run_configurations: Vec<RunConfiguration>,
    active_build: Option<ConfigUid>,
    active_deploy: Option<ConfigUid>,
    active_run: Option<ConfigUid>,
    events: Option<EventSink>,
}

impl Target {
    pub fn new(kit: impl Into<String>) -> Self {
        Self {
            uid: TargetUid::fresh(),
            kit: kit.into(),
            build_configurations: Vec::new(),
            deploy_configurations: Vec::new(),
            run_configurations: Vec::new(),
            active_build: None,
            active_deploy: None,
            active_run: None,
            events: None,
        }
    }

    pub fn uid(&self) -> TargetUid {
        self.uid
    }

    /// Name of the kit this target builds against
    pub fn kit(&self) -> &str {
        &self.kit
    }

    pub fn display_name(&self) -> &str {
        &self.kit
    }

    pub fn set_event_sink(&mut self, events: EventSink) {
        for config in &mut self.build_configurations {
            config.set_event_sink(events.clone());
        }
        for config in &mut self.deploy_configurations {
            config.set_event_sink(events.clone());
        }
        self.events = Some(events);
    }

    pub fn build_configurations(&self) -> &[BuildConfiguration] {
        &self.build_configurations
    }

    pub fn deploy_configurations(&self) -> &[DeployConfiguration] {
        &self.deploy_configurations
    }

    pub fn run_configurations(&self) -> &[RunConfiguration] {
        &self.run_configurations
    }

    /// Split mutable access to both configuration collections at once,
    /// used by the workspace tree walks
    pub(crate) fn configurations_mut(
        &mut self,
    ) -> (&mut [BuildConfiguration], &mut [DeployConfiguration]) {
        (
            &mut self.build_configurations,
            &mut self.deploy_configurations,
        )
    }

    pub fn build_configuration(&self, uid: ConfigUid) -> Option<&BuildConfiguration> {
        self.build_configurations.iter().find(|c| c.uid() == uid)
    }

    pub fn build_configuration_mut(&mut self, uid: ConfigUid) -> Option<&mut BuildConfiguration> {
        self.build_configurations
            .iter_mut()
            .find(|c| c.uid() == uid)
    }

    pub fn deploy_configuration(&self, uid: ConfigUid) -> Option<&DeployConfiguration> {
        self.deploy_configurations.iter().find(|c| c.uid() == uid)
    }

    pub fn deploy_configuration_mut(&mut self, uid: ConfigUid) -> Option<&mut DeployConfiguration> {
        self.deploy_configurations
            .iter_mut()
            .find(|c| c.uid() == uid)
    }

    pub fn active_build_configuration(&self) -> Option<&BuildConfiguration> {
        self.active_build.and_then(|uid| self.build_configuration(uid))
    }

    pub fn active_build_configuration_mut(&mut self) -> Option<&mut BuildConfiguration> {
        let uid = self.active_build?;
        self.build_configuration_mut(uid)
    }

    pub fn active_deploy_configuration(&self) -> Option<&DeployConfiguration> {
        self.active_deploy.and_then(|uid| self.deploy_configuration(uid))
    }

    pub fn active_deploy_configuration_mut(&mut self) -> Option<&mut DeployConfiguration> {
        let uid = self.active_deploy?;
        self.deploy_configuration_mut(uid)
    }

    pub fn active_run_configuration(&self) -> Option<&RunConfiguration> {
        self.active_run
            .and_then(|uid| self.run_configurations.iter().find(|c| c.uid() == uid))
    }

    /// Uid of the build configuration with this display name, if any
    pub fn build_configuration_by_name(&self, name: &str) -> Option<ConfigUid> {
        self.build_configurations
            .iter()
            .find(|c| c.display_name() == name)
            .map(BuildConfiguration::uid)
    }

    /// Add a configuration, uniquifying its display name among siblings;
    /// the first one added becomes active
    pub fn add_build_configuration(&mut self, mut config: BuildConfiguration) -> ConfigUid {
        let taken: Vec<&str> = self
            .build_configurations
            .iter()
            .map(BuildConfiguration::display_name)
            .collect();
        let unique = uniquify(config.display_name(), &taken);
        config.set_display_name(unique);
        if let Some(events) = &self.events {
            config.set_event_sink(events.clone());
        }
        let uid = config.uid();
        self.build_configurations.push(config);
        if self.active_build.is_none() {
            self.activate_build(Some(uid));
        }
        uid
    }

    pub fn add_deploy_configuration(&mut self, mut config: DeployConfiguration) -> ConfigUid {
        let taken: Vec<&str> = self
            .deploy_configurations
            .iter()
            .map(DeployConfiguration::display_name)
            .collect();
        let unique = uniquify(config.display_name(), &taken);
        config.set_display_name(unique);
        if let Some(events) = &self.events {
            config.set_event_sink(events.clone());
        }
        let uid = config.uid();
        self.deploy_configurations.push(config);
        if self.active_deploy.is_none() {
            self.active_deploy = Some(uid);
        }
        uid
    }

    pub fn add_run_configuration(&mut self, mut config: RunConfiguration) -> ConfigUid {
        let taken: Vec<&str> = self
            .run_configurations
            .iter()
            .map(RunConfiguration::display_name)
            .collect();
        let unique = uniquify(config.display_name(), &taken);
        config.set_display_name(unique);
        let uid = config.uid();
        self.run_configurations.push(config);
        if self.active_run.is_none() {
            self.active_run = Some(uid);
        }
        uid
    }

    /// Remove a configuration; rejected while it is part of a build, and the
    /// active selection moves to the first remaining one
    pub fn remove_build_configuration(&mut self, uid: ConfigUid, manager: &BuildManager) -> bool {
        let Some(pos) = self
            .build_configurations
            .iter()
            .position(|c| c.uid() == uid)
        else {
            return false;
        };
        if manager.is_building_configuration(uid) {
            return false;
        }
        self.build_configurations.remove(pos);
        if self.active_build == Some(uid) {
            let next = self.build_configurations.first().map(BuildConfiguration::uid);
            self.activate_build(next);
        }
        true
    }

    pub fn remove_deploy_configuration(&mut self, uid: ConfigUid, manager: &BuildManager) -> bool {
        let Some(pos) = self
            .deploy_configurations
            .iter()
            .position(|c| c.uid() == uid)
        else {
            return false;
        };
        if manager.is_building_configuration(uid) {
            return false;
        }
        self.deploy_configurations.remove(pos);
        if self.active_deploy == Some(uid) {
            self.active_deploy = self.deploy_configurations.first().map(DeployConfiguration::uid);
        }
        true
    }

    pub fn remove_run_configuration(&mut self, uid: ConfigUid) -> bool {
        let Some(pos) = self.run_configurations.iter().position(|c| c.uid() == uid) else {
            return false;
        };
        self.run_configurations.remove(pos);
        if self.active_run == Some(uid) {
            self.active_run = self.run_configurations.first().map(RunConfiguration::uid);
        }
        true
    }

    /// Accepted only for an owned configuration, or `None` on an empty
    /// collection
    pub fn set_active_build_configuration(&mut self, uid: Option<ConfigUid>) -> bool {
        match uid {
            None => {
                if !self.build_configurations.is_empty() {
                    return false;
                }
                self.active_build = None;
                true
            }
            Some(uid) => {
                if self.build_configuration(uid).is_none() {
                    return false;
                }
                if self.active_build != Some(uid) {
                    self.activate_build(Some(uid));
                }
                true
            }
        }
    }

    pub fn set_active_deploy_configuration(&mut self, uid: Option<ConfigUid>) -> bool {
        match uid {
            None => {
                if !self.deploy_configurations.is_empty() {
                    return false;
                }
                self.active_deploy = None;
                true
            }
            Some(uid) => {
                if self.deploy_configuration(uid).is_none() {
                    return false;
                }
                self.active_deploy = Some(uid);
                true
            }
        }
    }

    pub fn set_active_run_configuration(&mut self, uid: Option<ConfigUid>) -> bool {
        match uid {
            None => {
                if !self.run_configurations.is_empty() {
                    return false;
                }
                self.active_run = None;
                true
            }
            Some(uid) => {
                if !self.run_configurations.iter().any(|c| c.uid() == uid) {
                    return false;
                }
                self.active_run = Some(uid);
                true
            }
        }
    }

    /// Make sure every non-empty collection has an active member
    pub fn ensure_default_actives(&mut self) {
        if self.active_build.is_none() {
            let first = self.build_configurations.first().map(BuildConfiguration::uid);
            if first.is_some() {
                self.activate_build(first);
            }
        }
        if self.active_deploy.is_none() {
            self.active_deploy = self.deploy_configurations.first().map(DeployConfiguration::uid);
        }
        if self.active_run.is_none() {
            self.active_run = self.run_configurations.first().map(RunConfiguration::uid);
        }
    }

    fn activate_build(&mut self, uid: Option<ConfigUid>) {
        self.active_build = uid;
        if let (Some(events), Some(active)) = (&self.events, uid) {
            events.send(EngineEvent::EnvironmentChanged { config: active });
        }
    }

    pub fn to_map(&self) -> Store {
        let mut map = Store::new();
        map.insert(KIT_KEY.into(), Value::String(self.kit.clone()));

        map.insert(
            BUILD_CONFIGURATION_COUNT_KEY.into(),
            Value::from(self.build_configurations.len()),
        );
        for (index, config) in self.build_configurations.iter().enumerate() {
            map.insert(
                indexed_key(BUILD_CONFIGURATION_PREFIX, index),
                Value::Object(config.to_map()),
            );
        }
        map.insert(
            ACTIVE_BUILD_CONFIGURATION_KEY.into(),
            Value::from(self.active_position(self.active_build, |uid| {
                self.build_configurations.iter().position(|c| c.uid() == uid)
            })),
        );

        map.insert(
            DEPLOY_CONFIGURATION_COUNT_KEY.into(),
            Value::from(self.deploy_configurations.len()),
        );
        for (index, config) in self.deploy_configurations.iter().enumerate() {
            map.insert(
                indexed_key(DEPLOY_CONFIGURATION_PREFIX, index),
                Value::Object(config.to_map()),
            );
        }
        map.insert(
            ACTIVE_DEPLOY_CONFIGURATION_KEY.into(),
            Value::from(self.active_position(self.active_deploy, |uid| {
                self.deploy_configurations.iter().position(|c| c.uid() == uid)
            })),
        );

        map.insert(
            RUN_CONFIGURATION_COUNT_KEY.into(),
            Value::from(self.run_configurations.len()),
        );
        for (index, config) in self.run_configurations.iter().enumerate() {
            map.insert(
                indexed_key(RUN_CONFIGURATION_PREFIX, index),
                Value::Object(config.to_map()),
            );
        }
        map.insert(
            ACTIVE_RUN_CONFIGURATION_KEY.into(),
            Value::from(self.active_position(self.active_run, |uid| {
                self.run_configurations.iter().position(|c| c.uid() == uid)
            })),
        );
        map
    }

    fn active_position<F>(&self, active: Option<ConfigUid>, position: F) -> usize
    where
        F: Fn(ConfigUid) -> Option<usize>,
    {
        active.and_then(position).unwrap_or(0)
    }

    /// Restore the target; configurations that fail to restore are skipped
    /// with a warning, out-of-range active indices fall back to the first
    /// entry
    pub fn from_map(&mut self, map: &Store, registry: &StepRegistry) -> Result<(), StoreError> {
        self.kit = store::read_str_or(map, KIT_KEY, &self.kit)?.to_string();

        self.build_configurations.clear();
        let count = store::read_usize_or(map, BUILD_CONFIGURATION_COUNT_KEY, 0)?;
        for index in 0..count {
            let key = indexed_key(BUILD_CONFIGURATION_PREFIX, index);
            let Ok(config_map) = store::read_map(map, &key) else {
                tracing::warn!(key = %key, "Missing build configuration entry, skipping");
                continue;
            };
            let mut config = BuildConfiguration::new("Unnamed", "");
            match config.from_map(config_map, registry) {
                Ok(()) => {
                    if let Some(events) = &self.events {
                        config.set_event_sink(events.clone());
                    }
                    self.build_configurations.push(config);
                }
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Skipping unrestorable build configuration");
                }
            }
        }
        let active = store::read_usize_or(map, ACTIVE_BUILD_CONFIGURATION_KEY, 0)?;
        let active = if active < self.build_configurations.len() {
            active
        } else {
            if !self.build_configurations.is_empty() && active != 0 {
                tracing::warn!(
                    index = active,
                    "Active build configuration out of range, falling back to the first"
                );
            }
            0
        };
        self.active_build = self
            .build_configurations
            .get(active)
            .map(BuildConfiguration::uid);

        self.deploy_configurations.clear();
        let count = store::read_usize_or(map, DEPLOY_CONFIGURATION_COUNT_KEY, 0)?;
        for index in 0..count {
            let key = indexed_key(DEPLOY_CONFIGURATION_PREFIX, index);
            let Ok(config_map) = store::read_map(map, &key) else {
                tracing::warn!(key = %key, "Missing deploy configuration entry, skipping");
                continue;
            };
            let mut config = DeployConfiguration::new("Unnamed");
            match config.from_map(config_map, registry) {
                Ok(()) => {
                    if let Some(events) = &self.events {
                        config.set_event_sink(events.clone());
                    }
                    self.deploy_configurations.push(config);
                }
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Skipping unrestorable deploy configuration");
                }
            }
        }
        let active = store::read_usize_or(map, ACTIVE_DEPLOY_CONFIGURATION_KEY, 0)?;
        let active = if active < self.deploy_configurations.len() { active } else { 0 };
        self.active_deploy = self
            .deploy_configurations
            .get(active)
            .map(DeployConfiguration::uid);

        self.run_configurations.clear();
        let count = store::read_usize_or(map, RUN_CONFIGURATION_COUNT_KEY, 0)?;
        for index in 0..count {
            let key = indexed_key(RUN_CONFIGURATION_PREFIX, index);
            let Ok(config_map) = store::read_map(map, &key) else {
                tracing::warn!(key = %key, "Missing run configuration entry, skipping");
                continue;
            };
            let mut config = RunConfiguration::new("Unnamed");
            match config.from_map(config_map) {
                Ok(()) => self.run_configurations.push(config),
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Skipping unrestorable run configuration");
                }
            }
        }
        let active = store::read_usize_or(map, ACTIVE_RUN_CONFIGURATION_KEY, 0)?;
        let active = if active < self.run_configurations.len() { active } else { 0 };
        self.active_run = self
            .run_configurations
            .get(active)
            .map(RunConfiguration::uid);

        Ok(())
    }
}

/// First free name among `taken`, numbering duplicates from (2)
fn uniquify(name: &str, taken: &[&str]) -> String {
    if !taken.contains(&name) {
        return name.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{name} ({counter})");
        if !taken.contains(&candidate.as_str()) {
            return candidate;
        }
        counter += 1;
    }
}
