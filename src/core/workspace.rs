//! The workspace: every open project plus their dependency relations
//!
//! Dependencies are kept here rather than on the projects themselves so a
//! project never has to know who depends on it. Edges added through
//! [`Workspace::add_dependency`] are validated; restored sessions go through
//! [`Workspace::set_dependencies`] and are re-validated by the scheduler
//! before anything runs.

use std::collections::HashMap;

use crate::core::events::EventSink;
use crate::core::graph::DependencyGraph;
use crate::core::ids::{ListUid, ProjectUid, StepUid};
use crate::core::manager::BuildManager;
use crate::core::project::Project;
use crate::core::step::BuildStep;
use crate::core::steplist::BuildStepList;
use crate::error::GraphError;

#[derive(Debug, Default)]
pub struct Workspace {
    projects: Vec<Project>,
    /// Project name -> names of its direct dependencies
    dependencies: HashMap<String, Vec<String>>,
    events: Option<EventSink>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the event channel, wiring every project already present
    pub fn set_event_sink(&mut self, events: EventSink) {
        for project in &mut self.projects {
            project.set_event_sink(events.clone());
        }
        self.events = Some(events);
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, uid: ProjectUid) -> Option<&Project> {
        self.projects.iter().find(|project| project.uid() == uid)
    }

    pub fn project_mut(&mut self, uid: ProjectUid) -> Option<&mut Project> {
        self.projects.iter_mut().find(|project| project.uid() == uid)
    }

    pub fn find_project(&self, name: &str) -> Option<&Project> {
        self.projects
            .iter()
            .find(|project| project.display_name() == name)
    }

    pub fn find_project_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects
            .iter_mut()
            .find(|project| project.display_name() == name)
    }

    /// Add a project; its display name is uniquified within the workspace
    pub fn add_project(&mut self, mut project: Project) -> ProjectUid {
        let name = uniquify(
            project.display_name(),
            &self
                .projects
                .iter()
                .map(|existing| existing.display_name().to_string())
                .collect::<Vec<_>>(),
        );
        project.set_display_name(name);
        if let Some(events) = &self.events {
            project.set_event_sink(events.clone());
        }
        let uid = project.uid();
        self.projects.push(project);
        uid
    }

    /// Remove a project, rejected while any of its steps is queued
    ///
    /// Dependency edges from and to the project are dropped with it.
    pub fn remove_project(&mut self, uid: ProjectUid, manager: &BuildManager) -> bool {
        let Some(position) = self.projects.iter().position(|project| project.uid() == uid)
        else {
            return false;
        };
        if manager.is_building_project(uid) {
            return false;
        }
        let removed = self.projects.remove(position);
        let name = removed.display_name();
        self.dependencies.remove(name);
        for dependencies in self.dependencies.values_mut() {
            dependencies.retain(|dependency| dependency != name);
        }
        true
    }

    pub fn direct_dependencies(&self, project: &str) -> &[String] {
        self.dependencies
            .get(project)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Declare that `project` depends on `dependency`
    ///
    /// Both projects must exist, the edge must be new, and it must not close
    /// a cycle.
    pub fn add_dependency(&mut self, project: &str, dependency: &str) -> Result<(), GraphError> {
        if self.find_project(project).is_none() {
            return Err(GraphError::UnknownProject {
                name: project.to_string(),
            });
        }
        if self.find_project(dependency).is_none() {
            return Err(GraphError::UnknownProject {
                name: dependency.to_string(),
            });
        }
        let existing = self.dependencies.entry(project.to_string()).or_default();
        if existing.iter().any(|name| name == dependency) {
            return Err(GraphError::DuplicateDependency {
                project: project.to_string(),
                dependency: dependency.to_string(),
            });
        }
        existing.push(dependency.to_string());

        let names: Vec<&str> = self
            .projects
            .iter()
            .map(Project::display_name)
            .collect();
        if let Err(error) = self.graph().closure_order(&names) {
            if let Some(dependencies) = self.dependencies.get_mut(project) {
                dependencies.retain(|name| name != dependency);
            }
            return Err(error);
        }
        Ok(())
    }

    pub fn remove_dependency(&mut self, project: &str, dependency: &str) -> bool {
        let Some(dependencies) = self.dependencies.get_mut(project) else {
            return false;
        };
        let before = dependencies.len();
        dependencies.retain(|name| name != dependency);
        dependencies.len() != before
    }

    /// Replace a project's dependency list without validation
    ///
    /// Restore path: stored sessions are taken as written and re-validated
    /// when an order is actually computed.
    pub fn set_dependencies(&mut self, project: &str, dependencies: Vec<String>) {
        self.dependencies.insert(project.to_string(), dependencies);
    }

    fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for project in &self.projects {
            let name = project.display_name();
            graph.add_project(name, self.dependencies.get(name).cloned().unwrap_or_default());
        }
        graph
    }

    /// `requested` plus every transitive dependency, dependencies first
    pub fn dependency_closure(&self, requested: &[&str]) -> Result<Vec<String>, GraphError> {
        self.graph().closure_order(requested)
    }

    /// `requested` ordered so dependencies come before dependents
    pub fn dependency_order(&self, requested: &[&str]) -> Result<Vec<String>, GraphError> {
        self.graph().dependency_order(requested)
    }

    pub fn find_list(&self, uid: ListUid) -> Option<&BuildStepList> {
        self.lists().find(|list| list.uid() == uid)
    }

    pub fn find_list_mut(&mut self, uid: ListUid) -> Option<&mut BuildStepList> {
        self.lists_mut().find(|list| list.uid() == uid)
    }

    pub fn find_step_mut(&mut self, uid: StepUid) -> Option<&mut Box<dyn BuildStep>> {
        self.lists_mut()
            .flat_map(BuildStepList::steps_mut)
            .find(|step| step.data().uid() == uid)
    }

    fn lists(&self) -> impl Iterator<Item = &BuildStepList> {
        self.projects
            .iter()
            .flat_map(|project| project.targets())
            .flat_map(|target| {
                let build = target.build_configurations().iter().flat_map(|config| {
                    [config.build_steps(), config.clean_steps()]
                });
                let deploy = target
                    .deploy_configurations()
                    .iter()
                    .map(|config| config.deploy_steps());
                build.chain(deploy)
            })
    }

    fn lists_mut(&mut self) -> impl Iterator<Item = &mut BuildStepList> {
        self.projects.iter_mut().flat_map(|project| {
            project.targets_mut().iter_mut().flat_map(|target| {
                let (build, deploy) = target.configurations_mut();
                let build = build.iter_mut().flat_map(|config| {
                    let (build_steps, clean_steps) = config.lists_mut();
                    [build_steps, clean_steps]
                });
                let deploy = deploy.iter_mut().map(|config| config.deploy_steps_mut());
                build.chain(deploy)
            })
        })
    }
}

fn uniquify(name: &str, taken: &[String]) -> String {
    if !taken.iter().any(|existing| existing == name) {
        return name.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{name} ({counter})");
        if !taken.iter().any(|existing| *existing == candidate) {
            return candidate;
        }
        counter += 1;
    }
}
