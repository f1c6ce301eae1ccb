//! The build scheduler
//!
//! One [`BuildManager`] serializes all build, clean, and deploy activity
//! into a single FIFO queue and runs it strictly one step at a time.
//! Admission is all-or-nothing: every step of a request passes `init()`
//! before the first one runs, and any pre-flight failure rejects the whole
//! request with nothing queued. While entries are queued, per-object
//! counters answer "is this thing building" so structural mutation of
//! queued state can be refused.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::core::configuration::{BuildConfiguration, DeployConfiguration};
use crate::core::environment::Environment;
use crate::core::events::{EngineEvent, EventSink};
use crate::core::expand::MacroExpander;
use crate::core::ids::{ConfigUid, ListUid, ProjectUid, StepUid, TargetUid};
use crate::core::project::Project;
use crate::core::step::{PreflightContext, StepContext, StepState};
use crate::core::steplist::StepListKind;
use crate::core::target::Target;
use crate::core::task::{OutputEvent, OutputFormat, Task};
use crate::core::workspace::Workspace;
use crate::error::QueueError;

/// Which configurations of each target participate in a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigSelection {
    /// The active target and its active configuration
    #[default]
    Active,
    /// Every target and every build configuration
    All,
}

/// How much of the queue a failing step takes down with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbortPolicy {
    /// Drop the remaining entries of the failing target, keep going with
    /// independent work already queued
    #[default]
    FailingTarget,
    /// Drop the whole queue
    All,
}

/// One admitted step, with everything the drain loop needs to attribute it
#[derive(Debug)]
struct QueueEntry {
    step: StepUid,
    step_name: String,
    enabled: bool,
    list: ListUid,
    configuration: ConfigUid,
    target: TargetUid,
    project: ProjectUid,
    project_name: String,
    /// Progress title, the kind's display name ("Build", "Clean", "Deploy")
    kind_name: String,
    policy: AbortPolicy,
}

/// Everything needed to pre-flight one step list, gathered before any
/// mutable access to the list itself
struct Admission {
    list: ListUid,
    kind: StepListKind,
    configuration: ConfigUid,
    target: TargetUid,
    project: ProjectUid,
    project_name: String,
    environment: Environment,
    build_directory: PathBuf,
    expander: Arc<MacroExpander>,
}

#[derive(Debug)]
pub struct BuildManager {
    queue: VecDeque<QueueEntry>,
    running: bool,
    all_steps_succeeded: bool,
    /// Enabled steps finished so far in this batch
    progress: usize,
    /// Enabled steps admitted for this batch
    max_progress: usize,
    active_steps_per_configuration: HashMap<ConfigUid, usize>,
    active_steps_per_target: HashMap<TargetUid, usize>,
    active_steps_per_project: HashMap<ProjectUid, usize>,
    previous_project: Option<ProjectUid>,
    cancel: CancellationToken,
    events: EventSink,
}

impl BuildManager {
    pub fn new(events: EventSink) -> Self {
        Self {
            queue: VecDeque::new(),
            running: false,
            all_steps_succeeded: true,
            progress: 0,
            max_progress: 0,
            active_steps_per_configuration: HashMap::new(),
            active_steps_per_target: HashMap::new(),
            active_steps_per_project: HashMap::new(),
            previous_project: None,
            cancel: CancellationToken::new(),
            events: events.clone(),
        }
    }

    /// True from admission until the batch finishes, is cancelled, or fails
    pub fn is_building(&self) -> bool {
        !self.queue.is_empty() || self.running
    }

    pub fn is_building_project(&self, project: ProjectUid) -> bool {
        counted(&self.active_steps_per_project, &project)
    }

    pub fn is_building_target(&self, target: TargetUid) -> bool {
        counted(&self.active_steps_per_target, &target)
    }

    pub fn is_building_configuration(&self, configuration: ConfigUid) -> bool {
        counted(&self.active_steps_per_configuration, &configuration)
    }

    pub fn is_building_list(&self, list: ListUid) -> bool {
        self.queue.iter().any(|entry| entry.list == list)
    }

    pub fn is_building_step(&self, step: StepUid) -> bool {
        self.queue.iter().any(|entry| entry.step == step)
    }

    pub fn queued_step_count(&self) -> usize {
        self.queue.len()
    }

    /// A token that cancels the current batch when fired
    ///
    /// Handles belong to the batch they were taken for; the token is
    /// re-armed once that batch finishes.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the queued batch
    ///
    /// While a drain is running the shared token does the work. Called
    /// between admission and drain this discards the queue immediately and
    /// reports the batch as finished unsuccessfully. A no-op when idle.
    pub fn cancel(&mut self) {
        if self.running {
            self.cancel.cancel();
        } else if !self.queue.is_empty() {
            self.clear_queue();
            self.events.send(EngineEvent::QueueFinished { success: false });
            self.rearm();
        }
    }

    /// Queue the build steps of `projects`, dependencies first
    pub fn build_projects(
        &mut self,
        workspace: &mut Workspace,
        projects: &[&str],
        selection: ConfigSelection,
        policy: AbortPolicy,
    ) -> Result<usize, QueueError> {
        self.queue_projects(workspace, projects, &[StepListKind::Build], selection, policy)
    }

    /// Queue the clean steps of `projects`, dependencies first
    pub fn clean_projects(
        &mut self,
        workspace: &mut Workspace,
        projects: &[&str],
        selection: ConfigSelection,
        policy: AbortPolicy,
    ) -> Result<usize, QueueError> {
        self.queue_projects(workspace, projects, &[StepListKind::Clean], selection, policy)
    }

    /// Queue every project's clean steps, then every project's build steps
    pub fn rebuild_projects(
        &mut self,
        workspace: &mut Workspace,
        projects: &[&str],
        selection: ConfigSelection,
        policy: AbortPolicy,
    ) -> Result<usize, QueueError> {
        self.queue_projects(
            workspace,
            projects,
            &[StepListKind::Clean, StepListKind::Build],
            selection,
            policy,
        )
    }

    /// Queue every project's build steps, then every project's deploy steps
    ///
    /// Deployment always works on the active configurations.
    pub fn deploy_projects(
        &mut self,
        workspace: &mut Workspace,
        projects: &[&str],
        policy: AbortPolicy,
    ) -> Result<usize, QueueError> {
        self.queue_projects(
            workspace,
            projects,
            &[StepListKind::Build, StepListKind::Deploy],
            ConfigSelection::Active,
            policy,
        )
    }

    /// Queue explicit step lists, in the order given
    ///
    /// Unknown and empty lists are skipped.
    pub fn build_lists(
        &mut self,
        workspace: &mut Workspace,
        lists: &[ListUid],
        policy: AbortPolicy,
    ) -> Result<usize, QueueError> {
        if self.is_building() {
            return Err(QueueError::AlreadyBuilding);
        }
        let mut admissions = Vec::new();
        for uid in lists {
            match admission_for_list(workspace, *uid) {
                Some(admission) => admissions.push(admission),
                None => tracing::warn!(list = ?uid, "list not queued, unknown or empty"),
            }
        }
        self.append_queue(workspace, &admissions, policy)
    }

    fn queue_projects(
        &mut self,
        workspace: &mut Workspace,
        projects: &[&str],
        kinds: &[StepListKind],
        selection: ConfigSelection,
        policy: AbortPolicy,
    ) -> Result<usize, QueueError> {
        if self.is_building() {
            return Err(QueueError::AlreadyBuilding);
        }

        let order = match workspace.dependency_order(projects) {
            Ok(order) => order,
            Err(error) => {
                self.events.task(Task::error(error.to_string()));
                return Err(error.into());
            }
        };

        let mut skipped = HashSet::new();
        for name in &order {
            let Some(project) = workspace.find_project(name) else {
                continue;
            };
            if !project.build_system().has_parsing_data() {
                let message = format!("The project \"{name}\" is not configured, skipping it.");
                self.events
                    .output(OutputEvent::line(&message, OutputFormat::NormalMessage));
                self.events
                    .task(Task::warning(message).with_origin(name.clone()));
                skipped.insert(name.clone());
            }
        }

        let mut admissions = Vec::new();
        for kind in kinds {
            for name in &order {
                if skipped.contains(name) {
                    continue;
                }
                let Some(project) = workspace.find_project(name) else {
                    continue;
                };
                for target in targets_for_selection(project, selection) {
                    match kind {
                        StepListKind::Build | StepListKind::Clean => {
                            for config in configs_for_selection(target, selection) {
                                if let Some(admission) =
                                    build_admission(project, target, config, *kind)
                                {
                                    admissions.push(admission);
                                }
                            }
                        }
                        StepListKind::Deploy => {
                            if let Some(config) = target.active_deploy_configuration() {
                                if let Some(admission) = deploy_admission(project, target, config)
                                {
                                    admissions.push(admission);
                                }
                            }
                        }
                    }
                }
            }
        }

        self.append_queue(workspace, &admissions, policy)
    }

    /// Pre-flight every step, then commit the whole request or none of it
    fn append_queue(
        &mut self,
        workspace: &mut Workspace,
        admissions: &[Admission],
        policy: AbortPolicy,
    ) -> Result<usize, QueueError> {
        let mut pending = Vec::new();
        for admission in admissions {
            let Some(list) = workspace.find_list_mut(admission.list) else {
                continue;
            };
            let kind_name = admission.kind.display_name().to_string();
            for step in list.steps_mut() {
                let entry = QueueEntry {
                    step: step.data().uid(),
                    step_name: step.data().display_name().to_string(),
                    enabled: step.data().enabled(),
                    list: admission.list,
                    configuration: admission.configuration,
                    target: admission.target,
                    project: admission.project,
                    project_name: admission.project_name.clone(),
                    kind_name: kind_name.clone(),
                    policy,
                };
                if entry.enabled {
                    let mut tasks = Vec::new();
                    let mut ctx = PreflightContext {
                        environment: &admission.environment,
                        build_directory: &admission.build_directory,
                        expander: &admission.expander,
                        tasks: &mut tasks,
                    };
                    let ok = step.init(&mut ctx);
                    for task in tasks {
                        self.events.task(task);
                    }
                    if !ok {
                        self.events.output(OutputEvent::line(
                            format!(
                                "Error while building project \"{}\"",
                                admission.project_name
                            ),
                            OutputFormat::Stderr,
                        ));
                        self.events.output(OutputEvent::line(
                            format!("When executing step \"{}\"", entry.step_name),
                            OutputFormat::Stderr,
                        ));
                        return Err(QueueError::PreflightFailed {
                            project: admission.project_name.clone(),
                            step: entry.step_name,
                        });
                    }
                }
                pending.push(entry);
            }
        }

        if pending.is_empty() {
            return Ok(0);
        }
        let count = pending.len();
        for entry in pending {
            if entry.enabled {
                self.max_progress += 1;
            }
            self.admit_entry(&entry);
            self.queue.push_back(entry);
        }
        Ok(count)
    }

    /// Run the queue to completion, one step at a time
    ///
    /// Returns whether every step succeeded. Emits exactly one
    /// `QueueFinished` event, including for an empty queue (which finishes
    /// successfully right away).
    pub async fn drain(&mut self, workspace: &mut Workspace) -> bool {
        if self.queue.is_empty() {
            self.events.send(EngineEvent::QueueFinished { success: true });
            return true;
        }

        self.running = true;
        self.all_steps_succeeded = true;
        self.previous_project = None;
        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                return self.finish_cancelled();
            }
            let Some(entry) = self.queue.pop_front() else {
                break;
            };

            if self.previous_project != Some(entry.project) {
                self.events.output(OutputEvent::line(
                    format!("Running steps for project \"{}\"...", entry.project_name),
                    OutputFormat::NormalMessage,
                ));
                self.previous_project = Some(entry.project);
            }

            if !entry.enabled {
                self.events.output(OutputEvent::line(
                    format!("Skipping disabled step {}.", entry.step_name),
                    OutputFormat::NormalMessage,
                ));
                self.release_entry(&entry);
                continue;
            }

            self.events.send(EngineEvent::StepStarted {
                step: entry.step,
                name: entry.kind_name.clone(),
            });

            let success = match workspace.find_step_mut(entry.step) {
                Some(step) => {
                    step.data_mut().set_state(StepState::Running);
                    let ctx = StepContext {
                        cancel: self.cancel.clone(),
                        events: self.events.clone(),
                    };
                    let finished = step.run(ctx).await;
                    let state = if self.cancel.is_cancelled() {
                        StepState::Cancelled
                    } else if finished {
                        StepState::Succeeded
                    } else {
                        StepState::Failed
                    };
                    step.data_mut().set_state(state);
                    finished
                }
                None => {
                    tracing::warn!(step = ?entry.step, "queued step disappeared from the workspace");
                    false
                }
            };

            self.release_entry(&entry);

            if self.cancel.is_cancelled() {
                return self.finish_cancelled();
            }

            self.progress += 1;
            self.events.send(EngineEvent::Progress {
                finished: self.progress,
                total: self.max_progress,
                message: format!("Finished {} of {} steps", self.progress, self.max_progress),
            });

            if !success {
                self.all_steps_succeeded = false;
                self.events.output(OutputEvent::line(
                    format!("Error while building project \"{}\"", entry.project_name),
                    OutputFormat::Stderr,
                ));
                self.events.output(OutputEvent::line(
                    format!("When executing step \"{}\"", entry.step_name),
                    OutputFormat::Stderr,
                ));

                let mut abort = entry.policy == AbortPolicy::All;
                if !abort {
                    while self
                        .queue
                        .front()
                        .is_some_and(|next| next.target == entry.target)
                    {
                        if let Some(dropped) = self.queue.pop_front() {
                            self.release_entry(&dropped);
                        }
                    }
                    if self.queue.is_empty() {
                        abort = true;
                    }
                }
                if abort {
                    self.events.send(EngineEvent::Progress {
                        finished: self.progress,
                        total: self.max_progress,
                        message: format!(
                            "Error while building project \"{}\"",
                            entry.project_name
                        ),
                    });
                    break;
                }
            }
        }

        self.finish(started)
    }

    fn finish(&mut self, started: Instant) -> bool {
        let success = self.all_steps_succeeded;
        self.events.output(OutputEvent::line(
            format_elapsed_time(started.elapsed()),
            OutputFormat::NormalMessage,
        ));
        self.clear_queue();
        self.events.send(EngineEvent::QueueFinished { success });
        self.rearm();
        success
    }

    fn finish_cancelled(&mut self) -> bool {
        self.events.output(OutputEvent::line(
            "Canceled build/deployment.",
            OutputFormat::ErrorMessage,
        ));
        self.events.send(EngineEvent::Progress {
            finished: self.progress,
            total: self.max_progress,
            message: "Build/Deployment canceled".to_string(),
        });
        self.clear_queue();
        self.events.send(EngineEvent::QueueFinished { success: false });
        self.rearm();
        false
    }

    /// Drop every queued entry and reset batch state; counters go back to
    /// zero on the way out
    fn clear_queue(&mut self) {
        while let Some(entry) = self.queue.pop_front() {
            self.release_entry(&entry);
        }
        self.running = false;
        self.previous_project = None;
        self.progress = 0;
        self.max_progress = 0;
    }

    fn rearm(&mut self) {
        self.cancel = CancellationToken::new();
    }

    fn admit_entry(&mut self, entry: &QueueEntry) {
        increment(
            &mut self.active_steps_per_configuration,
            entry.configuration,
        );
        increment(&mut self.active_steps_per_target, entry.target);
        if increment(&mut self.active_steps_per_project, entry.project) {
            self.events.send(EngineEvent::BuildStateChanged {
                project: entry.project,
            });
        }
    }

    fn release_entry(&mut self, entry: &QueueEntry) {
        decrement(
            &mut self.active_steps_per_configuration,
            &entry.configuration,
        );
        decrement(&mut self.active_steps_per_target, &entry.target);
        if decrement(&mut self.active_steps_per_project, &entry.project) {
            self.events.send(EngineEvent::BuildStateChanged {
                project: entry.project,
            });
        }
    }
}

fn counted<K: Eq + Hash>(counts: &HashMap<K, usize>, key: &K) -> bool {
    counts.get(key).copied().unwrap_or(0) > 0
}

/// Returns true on the 0 -> 1 transition
fn increment<K: Eq + Hash>(counts: &mut HashMap<K, usize>, key: K) -> bool {
    let count = counts.entry(key).or_insert(0);
    *count += 1;
    *count == 1
}

/// Returns true on the 1 -> 0 transition
fn decrement<K: Eq + Hash>(counts: &mut HashMap<K, usize>, key: &K) -> bool {
    let Some(count) = counts.get_mut(key) else {
        return false;
    };
    if *count == 0 {
        return false;
    }
    *count -= 1;
    *count == 0
}

fn targets_for_selection(project: &Project, selection: ConfigSelection) -> Vec<&Target> {
    match selection {
        ConfigSelection::All => project.targets().iter().collect(),
        ConfigSelection::Active => project.active_target().into_iter().collect(),
    }
}

fn configs_for_selection(target: &Target, selection: ConfigSelection) -> Vec<&BuildConfiguration> {
    match selection {
        ConfigSelection::All => target.build_configurations().iter().collect(),
        ConfigSelection::Active => target.active_build_configuration().into_iter().collect(),
    }
}

fn build_admission(
    project: &Project,
    target: &Target,
    config: &BuildConfiguration,
    kind: StepListKind,
) -> Option<Admission> {
    let list = config.list(kind)?;
    if list.is_empty() {
        return None;
    }
    let source_directory = project.source_directory().display().to_string();
    let expander = config
        .macro_expander(project.display_name(), &source_directory)
        .into_shared();
    Some(Admission {
        list: list.uid(),
        kind,
        configuration: config.uid(),
        target: target.uid(),
        project: project.uid(),
        project_name: project.display_name().to_string(),
        environment: config.environment_with_base(project.build_system().parse_environment()),
        build_directory: PathBuf::from(expander.expand(config.build_directory())),
        expander,
    })
}

/// Deploy steps borrow their environment and build directory from the
/// target's active build configuration when it has one
fn deploy_admission(
    project: &Project,
    target: &Target,
    config: &DeployConfiguration,
) -> Option<Admission> {
    if config.deploy_steps().is_empty() {
        return None;
    }
    let source_directory = project.source_directory().display().to_string();
    let (environment, build_directory, expander) = match target.active_build_configuration() {
        Some(build) => {
            let expander = build
                .macro_expander(project.display_name(), &source_directory)
                .into_shared();
            (
                build.environment_with_base(project.build_system().parse_environment()),
                PathBuf::from(expander.expand(build.build_directory())),
                expander,
            )
        }
        None => {
            let mut expander = MacroExpander::new();
            expander.register_value("Project:Name", project.display_name());
            expander.register_value("sourceDir", &source_directory);
            (
                project.build_system().parse_environment(),
                PathBuf::from(&source_directory),
                expander.into_shared(),
            )
        }
    };
    Some(Admission {
        list: config.deploy_steps().uid(),
        kind: StepListKind::Deploy,
        configuration: config.uid(),
        target: target.uid(),
        project: project.uid(),
        project_name: project.display_name().to_string(),
        environment,
        build_directory,
        expander,
    })
}

fn admission_for_list(workspace: &Workspace, uid: ListUid) -> Option<Admission> {
    for project in workspace.projects() {
        for target in project.targets() {
            for config in target.build_configurations() {
                if config.build_steps().uid() == uid {
                    return build_admission(project, target, config, StepListKind::Build);
                }
                if config.clean_steps().uid() == uid {
                    return build_admission(project, target, config, StepListKind::Clean);
                }
            }
            for config in target.deploy_configurations() {
                if config.deploy_steps().uid() == uid {
                    return deploy_admission(project, target, config);
                }
            }
        }
    }
    None
}

fn format_elapsed_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("Elapsed time: {:02}:{:02}.", total / 60, total % 60)
}
