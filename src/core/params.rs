//! Resolution of external command invocations
//!
//! [`ProcessParameters`] turns a raw command line, working directory and
//! environment into the effective invocation handed to the process layer:
//! macros expanded, the executable searched on the environment's `PATH`,
//! the working directory environment-expanded and normalized. Resolution is
//! lazy and cached; every setter drops the cache. Failure to resolve the
//! command is a state (`command_missing`), never an error.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::core::environment::Environment;
use crate::core::expand::MacroExpander;

/// The resolved description of one external command invocation
#[derive(Debug, Default)]
pub struct ProcessParameters {
    command: String,
    arguments: String,
    working_directory: String,
    environment: Environment,
    expander: Option<Arc<MacroExpander>>,
    effective: Option<Effective>,
}

#[derive(Debug, Clone)]
struct Effective {
    command: PathBuf,
    arguments: String,
    working_directory: PathBuf,
    command_missing: bool,
}

impl ProcessParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = command.into();
        self.effective = None;
    }

    pub fn set_arguments(&mut self, arguments: impl Into<String>) {
        self.arguments = arguments.into();
        self.effective = None;
    }

    pub fn set_working_directory(&mut self, working_directory: impl Into<String>) {
        self.working_directory = working_directory.into();
        self.effective = None;
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
        self.effective = None;
    }

    pub fn set_macro_expander(&mut self, expander: Arc<MacroExpander>) {
        self.expander = Some(expander);
        self.effective = None;
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The resolved executable; falls back to the macro-expanded raw value
    /// when the search fails (see [`command_missing`](Self::command_missing))
    pub fn effective_command(&mut self) -> PathBuf {
        self.resolve().command
    }

    /// True when the last resolution could not locate the executable
    pub fn command_missing(&mut self) -> bool {
        self.resolve().command_missing
    }

    /// The macro-expanded argument string, still unsplit
    pub fn effective_arguments(&mut self) -> String {
        self.resolve().arguments
    }

    /// Macro-expanded, environment-expanded, normalized working directory
    pub fn effective_working_directory(&mut self) -> PathBuf {
        self.resolve().working_directory
    }

    /// One-line rendering for logs and step summaries
    pub fn summary(&mut self, display_name: &str) -> String {
        self.render_summary(display_name, false)
    }

    /// Like [`summary`](Self::summary), with the working directory appended
    pub fn summary_in_workdir(&mut self, display_name: &str) -> String {
        self.render_summary(display_name, true)
    }

    fn render_summary(&mut self, display_name: &str, with_workdir: bool) -> String {
        let resolved = self.resolve();
        if resolved.command_missing {
            return format!("{display_name}: Invalid command");
        }
        let mut text = format!(
            "{display_name}: {}",
            quote_arg(&resolved.command.display().to_string())
        );
        if !resolved.arguments.is_empty() {
            text.push(' ');
            text.push_str(&resolved.arguments);
        }
        if with_workdir {
            text.push_str(" in ");
            text.push_str(&resolved.working_directory.display().to_string());
        }
        text
    }

    fn expand(&self, input: &str) -> String {
        match &self.expander {
            Some(expander) => expander.expand(input),
            None => input.to_string(),
        }
    }

    fn resolve(&mut self) -> Effective {
        if let Some(effective) = &self.effective {
            return effective.clone();
        }

        let raw_dir = self.expand(&self.working_directory);
        let expanded_dir = self.environment.expand_variables(&raw_dir);
        let working_directory = if expanded_dir.is_empty() {
            PathBuf::from(".")
        } else {
            normalize_path(Path::new(&expanded_dir))
        };

        let expanded_command = self.expand(&self.command);
        let (command, command_missing) = match which::which_in(
            &expanded_command,
            self.environment.path_value(),
            &working_directory,
        ) {
            Ok(found) => (found, false),
            Err(_) => (PathBuf::from(&expanded_command), true),
        };

        let effective = Effective {
            command,
            arguments: self.expand(&self.arguments),
            working_directory,
            command_missing,
        };
        self.effective = Some(effective.clone());
        effective
    }
}

/// Quote a single argument for display when it needs it
fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if arg.contains(char::is_whitespace) || arg.contains('"') {
        let escaped = arg.replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        arg.to_string()
    }
}

/// Collapse `.` and `..` components without touching the filesystem
fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = result.pop();
                if !popped && result.as_os_str().is_empty() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}
