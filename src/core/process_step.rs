//! The custom process step
//!
//! Runs one external command with the owning configuration's environment.
//! `init` resolves the command line through [`ProcessParameters`] and caches
//! the finished invocation; `run` creates the working directory when it is
//! missing, spawns the child and streams its output, killing it on
//! cancellation.

use std::path::PathBuf;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::core::environment::Environment;
use crate::core::params::ProcessParameters;
use crate::core::step::{BuildStep, PreflightContext, StepContext, StepData};
use crate::core::store::{self, Store};
use crate::core::task::{OutputEvent, OutputFormat, Task};
use crate::error::StoreError;
use crate::infra::process::{self, Invocation, ProcessResult};

/// Factory id of the process step
pub const PROCESS_STEP_ID: &str = "buildmill.process_step";

const COMMAND_KEY: &str = "Command";
const ARGUMENTS_KEY: &str = "Arguments";
const WORKING_DIRECTORY_KEY: &str = "WorkingDirectory";
const IGNORE_RETURN_VALUE_KEY: &str = "IgnoreReturnValue";

#[derive(Debug, Clone)]
struct ResolvedInvocation {
    program: PathBuf,
    pretty_arguments: String,
    arguments: Vec<String>,
    working_directory: PathBuf,
    environment: Environment,
}

/// A step that runs one user-configured external command
#[derive(Debug)]
pub struct ProcessStep {
    data: StepData,
    command: String,
    arguments: String,
    working_directory: String,
    ignore_return_value: bool,
    resolved: Option<ResolvedInvocation>,
}

impl ProcessStep {
    pub fn new() -> Self {
        Self {
            data: StepData::new(PROCESS_STEP_ID, "Custom Process Step"),
            command: String::new(),
            arguments: String::new(),
            working_directory: String::new(),
            ignore_return_value: false,
            resolved: None,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = command.into();
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn set_arguments(&mut self, arguments: impl Into<String>) {
        self.arguments = arguments.into();
    }

    /// Raw working directory; empty means the configuration's build directory
    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    pub fn set_working_directory(&mut self, working_directory: impl Into<String>) {
        self.working_directory = working_directory.into();
    }

    pub fn ignore_return_value(&self) -> bool {
        self.ignore_return_value
    }

    pub fn set_ignore_return_value(&mut self, ignore: bool) {
        self.ignore_return_value = ignore;
    }
}

impl Default for ProcessStep {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildStep for ProcessStep {
    fn data(&self) -> &StepData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut StepData {
        &mut self.data
    }

    fn init(&mut self, ctx: &mut PreflightContext<'_>) -> bool {
        self.resolved = None;

        if self.command.trim().is_empty() {
            ctx.add_task(
                Task::error("The step has no command set.")
                    .with_origin(self.data.display_name()),
            );
            return false;
        }

        let mut params = ProcessParameters::new();
        params.set_environment(ctx.environment.clone());
        params.set_macro_expander(ctx.expander.clone());
        params.set_command(&self.command);
        params.set_arguments(&self.arguments);
        if self.working_directory.is_empty() {
            params.set_working_directory(ctx.build_directory.display().to_string());
        } else {
            params.set_working_directory(&self.working_directory);
        }

        let display_name = self.data.display_name().to_string();
        if params.command_missing() {
            self.data.set_summary_text(params.summary(&display_name));
            ctx.add_task(
                Task::error(format!(
                    "The command \"{}\" could not be found.",
                    self.command
                ))
                .with_origin(&display_name),
            );
            return false;
        }

        let pretty_arguments = params.effective_arguments();
        let Some(arguments) = shlex::split(&pretty_arguments) else {
            ctx.add_task(
                Task::error(format!(
                    "The argument string \"{pretty_arguments}\" could not be parsed."
                ))
                .with_origin(&display_name),
            );
            return false;
        };

        self.data
            .set_summary_text(params.summary_in_workdir(&display_name));
        self.resolved = Some(ResolvedInvocation {
            program: params.effective_command(),
            pretty_arguments,
            arguments,
            working_directory: params.effective_working_directory(),
            environment: params.environment().clone(),
        });
        true
    }

    fn run(&mut self, ctx: StepContext) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let Some(resolved) = self.resolved.as_ref() else {
                ctx.events.output(OutputEvent::line(
                    "Step was not initialized before running.".to_string(),
                    OutputFormat::ErrorMessage,
                ));
                return false;
            };

            if !resolved.working_directory.exists() {
                if let Err(error) =
                    tokio::fs::create_dir_all(&resolved.working_directory).await
                {
                    ctx.events.output(OutputEvent::line(
                        format!(
                            "Could not create directory \"{}\"",
                            resolved.working_directory.display()
                        ),
                        OutputFormat::ErrorMessage,
                    ));
                    tracing::debug!(error = %error, "Working directory creation failed");
                    return false;
                }
            }

            ctx.events.output(OutputEvent::line(
                format!(
                    "Starting: \"{}\" {}",
                    resolved.program.display(),
                    resolved.pretty_arguments
                ),
                OutputFormat::NormalMessage,
            ));

            let invocation = Invocation {
                program: &resolved.program,
                arguments: &resolved.arguments,
                working_directory: &resolved.working_directory,
                environment: &resolved.environment,
            };
            let command = resolved.program.display();
            match process::run(invocation, &ctx.events, &ctx.cancel).await {
                Ok(ProcessResult::Exited(0)) => {
                    ctx.events.output(OutputEvent::line(
                        format!("The process \"{command}\" exited normally."),
                        OutputFormat::NormalMessage,
                    ));
                    true
                }
                Ok(ProcessResult::Exited(code)) => {
                    ctx.events.output(OutputEvent::line(
                        format!("The process \"{command}\" exited with code {code}."),
                        OutputFormat::ErrorMessage,
                    ));
                    self.ignore_return_value
                }
                Ok(ProcessResult::Crashed) => {
                    ctx.events.output(OutputEvent::line(
                        format!("The process \"{command}\" crashed."),
                        OutputFormat::ErrorMessage,
                    ));
                    self.ignore_return_value
                }
                Ok(ProcessResult::Cancelled) => false,
                Err(error) => {
                    ctx.events.output(OutputEvent::line(
                        format!(
                            "Could not start process \"{command}\" {}",
                            resolved.pretty_arguments
                        ),
                        OutputFormat::ErrorMessage,
                    ));
                    tracing::debug!(error = %error, "Process spawn failed");
                    false
                }
            }
        })
    }

    fn to_map(&self) -> Store {
        let mut map = self.data.to_map();
        map.insert(COMMAND_KEY.into(), Value::String(self.command.clone()));
        map.insert(ARGUMENTS_KEY.into(), Value::String(self.arguments.clone()));
        map.insert(
            WORKING_DIRECTORY_KEY.into(),
            Value::String(self.working_directory.clone()),
        );
        map.insert(
            IGNORE_RETURN_VALUE_KEY.into(),
            Value::Bool(self.ignore_return_value),
        );
        map
    }

    fn restore_from_map(&mut self, map: &Store) -> Result<(), StoreError> {
        self.data.restore_from_map(map)?;
        self.command = store::read_str_or(map, COMMAND_KEY, &self.command)?.to_string();
        self.arguments = store::read_str_or(map, ARGUMENTS_KEY, &self.arguments)?.to_string();
        self.working_directory =
            store::read_str_or(map, WORKING_DIRECTORY_KEY, &self.working_directory)?.to_string();
        self.ignore_return_value =
            store::read_bool_or(map, IGNORE_RETURN_VALUE_KEY, self.ignore_return_value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::core::events::{EngineEvent, EventSink};
    use crate::core::expand::MacroExpander;
    use crate::core::task::Severity;

    fn test_environment() -> Environment {
        let mut env = Environment::new();
        env.set("PATH", "/bin:/usr/bin");
        env
    }

    fn run_init(step: &mut ProcessStep, build_dir: &Path) -> (bool, Vec<Task>) {
        let environment = test_environment();
        let expander = Arc::new(MacroExpander::new());
        let mut tasks = Vec::new();
        let mut ctx = PreflightContext {
            environment: &environment,
            build_directory: build_dir,
            expander: &expander,
            tasks: &mut tasks,
        };
        let ok = step.init(&mut ctx);
        (ok, tasks)
    }

    fn drain_output(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Vec<(String, OutputFormat)> {
        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::Output(output) = event {
                lines.push((output.text, output.format));
            }
        }
        lines
    }

    async fn run_step(step: &mut ProcessStep) -> (bool, Vec<(String, OutputFormat)>) {
        let (events, mut rx) = EventSink::channel();
        let ctx = StepContext {
            cancel: CancellationToken::new(),
            events,
        };
        let ok = step.run(ctx).await;
        (ok, drain_output(&mut rx))
    }

    #[test]
    fn test_init_rejects_empty_command() {
        let mut step = ProcessStep::new();
        let (ok, tasks) = run_init(&mut step, Path::new("/tmp"));
        assert!(!ok);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].severity, Severity::Error);
        assert!(tasks[0].description.contains("no command set"));
    }

    #[test]
    fn test_init_rejects_missing_command() {
        let mut step = ProcessStep::new();
        step.set_command("no-such-tool-anywhere");
        let (ok, tasks) = run_init(&mut step, Path::new("/tmp"));
        assert!(!ok);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].description.contains("no-such-tool-anywhere"));
        assert!(step.data().summary_text().contains("Invalid command"));
    }

    #[test]
    fn test_init_rejects_unbalanced_arguments() {
        let mut step = ProcessStep::new();
        step.set_command("sh");
        step.set_arguments("-c 'unterminated");
        let (ok, tasks) = run_init(&mut step, Path::new("/tmp"));
        assert!(!ok);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].description.contains("could not be parsed"));
    }

    #[test]
    fn test_init_resolves_and_summarizes() {
        let mut step = ProcessStep::new();
        step.set_command("sh");
        step.set_arguments("-c true");
        let (ok, tasks) = run_init(&mut step, Path::new("/tmp"));
        assert!(ok);
        assert!(tasks.is_empty());
        assert!(step.data().summary_text().contains("sh"));
        assert!(step.data().summary_text().contains("in /tmp"));
    }

    #[tokio::test]
    async fn test_run_without_init_fails() {
        let mut step = ProcessStep::new();
        step.set_command("sh");
        let (ok, output) = run_step(&mut step).await;
        assert!(!ok);
        assert!(output[0].0.contains("not initialized"));
    }

    #[tokio::test]
    async fn test_run_reports_normal_exit() {
        let mut step = ProcessStep::new();
        step.set_command("sh");
        step.set_arguments("-c 'echo hello'");
        let (ok, _) = run_init(&mut step, Path::new("/tmp"));
        assert!(ok);

        let (ok, output) = run_step(&mut step).await;
        assert!(ok);
        assert!(output[0].0.starts_with("Starting: "));
        assert!(output
            .iter()
            .any(|(text, format)| text == "hello" && *format == OutputFormat::Stdout));
        assert!(output
            .iter()
            .any(|(text, _)| text.ends_with("exited normally.")));
    }

    #[tokio::test]
    async fn test_run_reports_exit_code_and_honors_ignore_flag() {
        let mut step = ProcessStep::new();
        step.set_command("sh");
        step.set_arguments("-c 'exit 7'");
        let (ok, _) = run_init(&mut step, Path::new("/tmp"));
        assert!(ok);
        let (ok, output) = run_step(&mut step).await;
        assert!(!ok);
        assert!(output
            .iter()
            .any(|(text, format)| text.ends_with("exited with code 7.")
                && *format == OutputFormat::ErrorMessage));

        step.set_ignore_return_value(true);
        let (ok, _) = run_step(&mut step).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_run_creates_missing_working_directory() {
        let temp = tempfile::tempdir().unwrap();
        let workdir = temp.path().join("nested").join("out");
        let mut step = ProcessStep::new();
        step.set_command("sh");
        step.set_arguments("-c pwd");
        step.set_working_directory(workdir.display().to_string());
        let (ok, _) = run_init(&mut step, temp.path());
        assert!(ok);
        let (ok, _) = run_step(&mut step).await;
        assert!(ok);
        assert!(workdir.is_dir());
    }

    #[tokio::test]
    async fn test_empty_working_directory_falls_back_to_build_dir() {
        let temp = tempfile::tempdir().unwrap();
        let mut step = ProcessStep::new();
        step.set_command("sh");
        step.set_arguments("-c pwd");
        let (ok, _) = run_init(&mut step, temp.path());
        assert!(ok);
        let (ok, output) = run_step(&mut step).await;
        assert!(ok);
        let expected = temp.path().canonicalize().unwrap();
        assert!(output.iter().any(|(text, format)| {
            *format == OutputFormat::Stdout && Path::new(text) == expected
        }));
    }

    #[test]
    fn test_persistence_round_trip() {
        let mut step = ProcessStep::new();
        step.set_command("make");
        step.set_arguments("-j4 all");
        step.set_working_directory("/src/project");
        step.set_ignore_return_value(true);
        step.data_mut().set_display_name("Make");
        step.data_mut().set_enabled(false);

        let map = step.to_map();
        let mut restored = ProcessStep::new();
        restored.restore_from_map(&map).unwrap();
        assert_eq!(restored.command(), "make");
        assert_eq!(restored.arguments(), "-j4 all");
        assert_eq!(restored.working_directory(), "/src/project");
        assert!(restored.ignore_return_value());
        assert_eq!(restored.data().display_name(), "Make");
        assert!(!restored.data().enabled());
    }
}
