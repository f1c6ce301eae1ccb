//! Projects and their targets
//!
//! A [`Project`] owns the targets built from one source tree and tracks
//! which of them is active. The actual toolchain knowledge lives behind the
//! [`BuildSystem`] trait so the engine never has to parse project files
//! itself.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::environment::Environment;
use crate::core::events::EventSink;
use crate::core::ids::{ConfigUid, ProjectUid, TargetUid};
use crate::core::manager::BuildManager;
use crate::core::target::{SetActive, Target};

/// Toolchain-side collaborator of a project
///
/// The scheduler only asks two things of it: whether the project has been
/// parsed well enough to build, and what base environment a build should
/// inherit.
pub trait BuildSystem: Send {
    /// Human-readable name, used in diagnostics
    fn name(&self) -> &str;

    /// Whether the project's structure is known
    ///
    /// Projects without parsing data are skipped at enqueue time instead of
    /// failing halfway through a batch.
    fn has_parsing_data(&self) -> bool {
        true
    }

    /// Base environment for build configurations of this project
    fn parse_environment(&self) -> Environment {
        Environment::system()
    }
}

/// Built-in [`BuildSystem`] with fixed answers
///
/// Used by the pipeline front end, where the manifest author declares
/// everything and there is nothing to parse.
pub struct StaticBuildSystem {
    name: String,
    has_parsing_data: bool,
}

impl StaticBuildSystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_parsing_data: true,
        }
    }

    /// Same, but reporting no parsing data
    pub fn unparsed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_parsing_data: false,
        }
    }
}

impl BuildSystem for StaticBuildSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_parsing_data(&self) -> bool {
        self.has_parsing_data
    }
}

/// A buildable project inside a workspace
pub struct Project {
    uid: ProjectUid,
    display_name: String,
    source_directory: PathBuf,
    build_system: Box<dyn BuildSystem>,
    targets: Vec<Target>,
    active_target: Option<TargetUid>,
    events: Option<EventSink>,
}

impl Project {
    pub fn new(display_name: impl Into<String>, source_directory: impl Into<PathBuf>) -> Self {
        let display_name = display_name.into();
        let build_system = StaticBuildSystem::new(display_name.clone());
        Self {
            uid: ProjectUid::fresh(),
            display_name,
            source_directory: source_directory.into(),
            build_system: Box::new(build_system),
            targets: Vec::new(),
            active_target: None,
            events: None,
        }
    }

    pub fn uid(&self) -> ProjectUid {
        self.uid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }

    pub fn source_directory(&self) -> &Path {
        &self.source_directory
    }

    pub fn build_system(&self) -> &dyn BuildSystem {
        self.build_system.as_ref()
    }

    pub fn set_build_system(&mut self, build_system: Box<dyn BuildSystem>) {
        self.build_system = build_system;
    }

    /// Attach the event channel, wiring every owned target as well
    pub fn set_event_sink(&mut self, events: EventSink) {
        for target in &mut self.targets {
            target.set_event_sink(events.clone());
        }
        self.events = Some(events);
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut [Target] {
        &mut self.targets
    }

    pub fn target(&self, uid: TargetUid) -> Option<&Target> {
        self.targets.iter().find(|target| target.uid() == uid)
    }

    pub fn target_mut(&mut self, uid: TargetUid) -> Option<&mut Target> {
        self.targets.iter_mut().find(|target| target.uid() == uid)
    }

    pub fn active_target_uid(&self) -> Option<TargetUid> {
        self.active_target
    }

    pub fn active_target(&self) -> Option<&Target> {
        self.active_target.and_then(|uid| self.target(uid))
    }

    pub fn active_target_mut(&mut self) -> Option<&mut Target> {
        match self.active_target {
            Some(uid) => self.target_mut(uid),
            None => None,
        }
    }

    /// Add a target; the first one added becomes active
    pub fn add_target(&mut self, mut target: Target) -> TargetUid {
        if let Some(events) = &self.events {
            target.set_event_sink(events.clone());
        }
        let uid = target.uid();
        self.targets.push(target);
        if self.active_target.is_none() {
            self.set_active_target(Some(uid), SetActive::Cascade);
        }
        uid
    }

    /// Remove a target, rejected while any of its steps is queued
    ///
    /// Removing the active target activates the first remaining one.
    pub fn remove_target(&mut self, uid: TargetUid, manager: &BuildManager) -> bool {
        let Some(position) = self.targets.iter().position(|target| target.uid() == uid) else {
            return false;
        };
        if manager.is_building_target(uid) {
            return false;
        }
        self.targets.remove(position);
        if self.active_target == Some(uid) {
            self.active_target = None;
            let next = self.targets.first().map(Target::uid);
            self.set_active_target(next, SetActive::Cascade);
        }
        true
    }

    /// Change the active target
    ///
    /// Only targets owned by this project are accepted; `None` is accepted
    /// only while the project has no targets. [`SetActive::Cascade`] also
    /// makes sure the newly active target has an active configuration of
    /// every non-empty kind.
    pub fn set_active_target(&mut self, uid: Option<TargetUid>, mode: SetActive) -> bool {
        match uid {
            None => {
                if !self.targets.is_empty() {
                    return false;
                }
                self.active_target = None;
                true
            }
            Some(uid) => {
                let Some(target) = self.target_mut(uid) else {
                    return false;
                };
                if mode == SetActive::Cascade {
                    target.ensure_default_actives();
                }
                self.active_target = Some(uid);
                true
            }
        }
    }

    /// Change a target's active build configuration
    ///
    /// With [`SetActive::Cascade`], sibling targets that own a build
    /// configuration with the same display name switch to it too, so "make
    /// Release active" applies across kits.
    pub fn set_active_build_configuration(
        &mut self,
        target: TargetUid,
        configuration: ConfigUid,
        mode: SetActive,
    ) -> bool {
        let Some(chosen) = self.target_mut(target) else {
            return false;
        };
        if !chosen.set_active_build_configuration(Some(configuration)) {
            return false;
        }
        if mode == SetActive::Cascade {
            let name = match chosen
                .build_configuration(configuration)
                .map(|config| config.display_name().to_string())
            {
                Some(name) => name,
                None => return true,
            };
            for sibling in &mut self.targets {
                if sibling.uid() == target {
                    continue;
                }
                if let Some(uid) = sibling.build_configuration_by_name(&name) {
                    sibling.set_active_build_configuration(Some(uid));
                }
            }
        }
        true
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("uid", &self.uid)
            .field("display_name", &self.display_name)
            .field("source_directory", &self.source_directory)
            .field("build_system", &self.build_system.name())
            .field("targets", &self.targets)
            .field("active_target", &self.active_target)
            .finish()
    }
}
