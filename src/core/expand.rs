//! Macro expansion for command lines and paths
//!
//! A [`MacroExpander`] resolves `%{name}` references against registered
//! variables. Values come from closures so callers can expose live state
//! (the active build directory, the project name) without copying it into
//! every consumer. Expansion is recursive - a variable's value may itself
//! contain references - with a fixed depth cap to keep self-referential
//! definitions from looping.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::config::defaults::MAX_EXPANSION_DEPTH;

fn macro_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"%\{([A-Za-z_][A-Za-z0-9_.:]*)\}").expect("Invalid macro pattern")
    })
}

type Provider = Box<dyn Fn() -> String + Send + Sync>;

/// Registry of `%{name}` variables
#[derive(Default)]
pub struct MacroExpander {
    variables: HashMap<String, Provider>,
}

impl std::fmt::Debug for MacroExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.variables.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("MacroExpander")
            .field("variables", &names)
            .finish()
    }
}

impl MacroExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable backed by a closure
    pub fn register<F>(&mut self, name: impl Into<String>, provider: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.variables.insert(name.into(), Box::new(provider));
    }

    /// Register a variable with a fixed value
    pub fn register_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        self.register(name, move || value.clone());
    }

    /// Resolve a single variable by name
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.variables.get(name).map(|provider| provider())
    }

    /// Expand every `%{name}` reference in `input`
    ///
    /// Unknown variables are left as-is so callers can tell an unset macro
    /// from an empty value. Expansion repeats until the string is stable or
    /// the depth cap is reached.
    pub fn expand(&self, input: &str) -> String {
        let re = macro_pattern();

        let mut current = input.to_string();
        for _ in 0..MAX_EXPANSION_DEPTH {
            let mut changed = false;
            let mut output = String::with_capacity(current.len());
            let mut last_end = 0;

            for cap in re.captures_iter(&current) {
                let Some(full) = cap.get(0) else { continue };
                output.push_str(&current[last_end..full.start()]);
                match self.resolve(&cap[1]) {
                    Some(value) => {
                        output.push_str(&value);
                        changed = true;
                    }
                    None => output.push_str(full.as_str()),
                }
                last_end = full.end();
            }
            output.push_str(&current[last_end..]);

            if !changed {
                return output;
            }
            current = output;
        }
        current
    }

    /// Shared handle used by [`crate::core::params::ProcessParameters`]
    pub fn into_shared(self) -> Arc<MacroExpander> {
        Arc::new(self)
    }
}
