//! Environment snapshots and user deltas
//!
//! An [`Environment`] is an owned snapshot of variables handed to child
//! processes; build configurations derive theirs from a base (the system
//! environment, or a clean one) plus an ordered list of
//! [`EnvironmentItem`] user changes. Items carry one of four operations and
//! round-trip through the compact string form used by the persistence layer:
//! `NAME=value` (set), `NAME` (unset), `NAME+=value` (append),
//! `NAME=+value` (prepend).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

#[cfg(not(windows))]
const LIST_SEPARATOR: char = ':';
#[cfg(windows)]
const LIST_SEPARATOR: char = ';';

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid variable pattern")
    })
}

/// An ordered variable snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    map: BTreeMap<String, String>,
}

impl Environment {
    /// An empty (clean) environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment
    pub fn system() -> Self {
        Self {
            map: std::env::vars().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    pub fn unset(&mut self, name: &str) {
        self.map.remove(name);
    }

    /// Append `value` to a list-valued variable, or set it when absent
    pub fn append_or_set(&mut self, name: &str, value: &str) {
        match self.map.get_mut(name) {
            Some(existing) if !existing.is_empty() => {
                existing.push(LIST_SEPARATOR);
                existing.push_str(value);
            }
            _ => {
                self.map.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Prepend `value` to a list-valued variable, or set it when absent
    pub fn prepend_or_set(&mut self, name: &str, value: &str) {
        match self.map.get_mut(name) {
            Some(existing) if !existing.is_empty() => {
                let mut combined = String::with_capacity(value.len() + existing.len() + 1);
                combined.push_str(value);
                combined.push(LIST_SEPARATOR);
                combined.push_str(existing);
                *existing = combined;
            }
            _ => {
                self.map.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// The `PATH` value used for command searches, if any
    pub fn path_value(&self) -> Option<&str> {
        self.get("PATH")
    }

    /// Expand `${VAR}` references against this snapshot
    ///
    /// Unknown variables are left intact; an unset variable is not the same
    /// thing as an empty one.
    pub fn expand_variables(&self, input: &str) -> String {
        let re = variable_pattern();
        let mut output = String::with_capacity(input.len());
        let mut last_end = 0;

        for cap in re.captures_iter(input) {
            let Some(full) = cap.get(0) else { continue };
            output.push_str(&input[last_end..full.start()]);
            match self.get(&cap[1]) {
                Some(value) => output.push_str(value),
                None => output.push_str(full.as_str()),
            }
            last_end = full.end();
        }
        output.push_str(&input[last_end..]);
        output
    }

    /// Apply user deltas in order
    pub fn apply_items(&mut self, items: &[EnvironmentItem]) {
        for item in items {
            item.apply(self);
        }
    }

    /// Variables in sorted order, ready for `Command::envs`
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// What an [`EnvironmentItem`] does to its variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentOperation {
    Set,
    Unset,
    Append,
    Prepend,
}

/// One user-ordered change to an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentItem {
    pub name: String,
    pub value: String,
    pub operation: EnvironmentOperation,
}

impl EnvironmentItem {
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            operation: EnvironmentOperation::Set,
        }
    }

    pub fn unset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            operation: EnvironmentOperation::Unset,
        }
    }

    pub fn append(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            operation: EnvironmentOperation::Append,
        }
    }

    pub fn prepend(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            operation: EnvironmentOperation::Prepend,
        }
    }

    fn apply(&self, env: &mut Environment) {
        match self.operation {
            EnvironmentOperation::Set => env.set(&self.name, &self.value),
            EnvironmentOperation::Unset => env.unset(&self.name),
            EnvironmentOperation::Append => env.append_or_set(&self.name, &self.value),
            EnvironmentOperation::Prepend => env.prepend_or_set(&self.name, &self.value),
        }
    }

    /// Compact single-string form used by the persistence layer
    pub fn to_setting(&self) -> String {
        match self.operation {
            EnvironmentOperation::Set => format!("{}={}", self.name, self.value),
            EnvironmentOperation::Unset => self.name.clone(),
            EnvironmentOperation::Append => format!("{}+={}", self.name, self.value),
            EnvironmentOperation::Prepend => format!("{}=+{}", self.name, self.value),
        }
    }

    /// Parse the compact form; `None` for strings with an empty name
    pub fn from_setting(setting: &str) -> Option<Self> {
        if let Some((name, value)) = setting.split_once("+=") {
            if !name.is_empty() {
                return Some(Self::append(name, value));
            }
        }
        match setting.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                if let Some(prepended) = value.strip_prefix('+') {
                    Some(Self::prepend(name, prepended))
                } else {
                    Some(Self::set(name, value))
                }
            }
            Some(_) => None,
            None => {
                if setting.is_empty() {
                    None
                } else {
                    Some(Self::unset(setting))
                }
            }
        }
    }
}
