//! Test utilities: scripted steps and property-test generators

#[cfg(test)]
pub mod fakes {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::BoxFuture;

    use crate::core::configuration::BuildConfiguration;
    use crate::core::project::Project;
    use crate::core::step::{BuildStep, PreflightContext, StepContext, StepData};
    use crate::core::target::Target;

    /// Shared record of every `init`/`run` call, in order
    pub type RunLog = Arc<Mutex<Vec<String>>>;

    pub fn run_log() -> RunLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn log_entries(log: &RunLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// A step whose behavior is fixed up front
    pub struct ScriptedStep {
        data: StepData,
        init_result: bool,
        run_result: bool,
        waits_for_cancel: bool,
        log: RunLog,
    }

    impl ScriptedStep {
        pub fn ok(name: &str, log: &RunLog) -> Self {
            Self {
                data: StepData::new("buildmill.scripted_step", name),
                init_result: true,
                run_result: true,
                waits_for_cancel: false,
                log: Arc::clone(log),
            }
        }

        /// Initializes fine, fails when run
        pub fn failing(name: &str, log: &RunLog) -> Self {
            Self {
                run_result: false,
                ..Self::ok(name, log)
            }
        }

        /// Fails pre-flight validation
        pub fn failing_init(name: &str, log: &RunLog) -> Self {
            Self {
                init_result: false,
                ..Self::ok(name, log)
            }
        }

        /// Runs until cancelled, then reports failure
        pub fn waiting_for_cancel(name: &str, log: &RunLog) -> Self {
            Self {
                waits_for_cancel: true,
                ..Self::ok(name, log)
            }
        }

        pub fn disabled(name: &str, log: &RunLog) -> Self {
            let mut step = Self::ok(name, log);
            step.data.set_enabled(false);
            step
        }
    }

    impl BuildStep for ScriptedStep {
        fn data(&self) -> &StepData {
            &self.data
        }

        fn data_mut(&mut self) -> &mut StepData {
            &mut self.data
        }

        fn init(&mut self, _ctx: &mut PreflightContext<'_>) -> bool {
            self.log
                .lock()
                .unwrap()
                .push(format!("init:{}", self.data.display_name()));
            self.init_result
        }

        fn run(&mut self, ctx: StepContext) -> BoxFuture<'_, bool> {
            let name = self.data.display_name().to_string();
            let log = Arc::clone(&self.log);
            let result = self.run_result;
            let waits = self.waits_for_cancel;
            Box::pin(async move {
                log.lock().unwrap().push(format!("run:{name}"));
                if waits {
                    tokio::select! {
                        () = ctx.cancel.cancelled() => return false,
                        () = tokio::time::sleep(Duration::from_secs(30)) => return false,
                    }
                }
                result
            })
        }
    }

    /// One project, one target, one "Debug" build configuration holding the
    /// given build steps
    pub fn project_with_steps(name: &str, steps: Vec<Box<dyn BuildStep>>) -> Project {
        let mut config = BuildConfiguration::new("Debug", format!("/tmp/{name}-build"));
        for step in steps {
            config.build_steps_mut().append_step(step);
        }
        let mut target = Target::new("desktop");
        target.add_build_configuration(config);
        let mut project = Project::new(name, format!("/src/{name}"));
        project.add_target(target);
        project
    }
}

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    use crate::core::environment::{EnvironmentItem, EnvironmentOperation};

    /// Generate a plausible environment variable name
    pub fn variable_name() -> impl Strategy<Value = String> {
        "[A-Z_][A-Z0-9_]{0,15}"
    }

    /// Generate a value free of the characters the codec reserves
    pub fn variable_value() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_/.:-]{0,24}"
    }

    /// Generate an arbitrary environment delta
    pub fn environment_item() -> impl Strategy<Value = EnvironmentItem> {
        (variable_name(), variable_value(), 0u8..4).prop_map(|(name, value, op)| {
            let operation = match op {
                0 => EnvironmentOperation::Set,
                1 => EnvironmentOperation::Unset,
                2 => EnvironmentOperation::Append,
                _ => EnvironmentOperation::Prepend,
            };
            EnvironmentItem {
                name,
                value,
                operation,
            }
        })
    }

    /// Generate a configuration display name
    pub fn display_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9 ]{0,20}"
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::core::environment::{EnvironmentItem, EnvironmentOperation};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_environment_item_setting_round_trips(item in environment_item()) {
            let setting = item.to_setting();
            let restored = EnvironmentItem::from_setting(&setting).unwrap();
            prop_assert_eq!(restored.name, item.name);
            prop_assert_eq!(restored.operation, item.operation);
            if item.operation != EnvironmentOperation::Unset {
                prop_assert_eq!(restored.value, item.value);
            }
        }

        #[test]
        fn test_variable_name_generator(name in variable_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(!name.contains('='));
            prop_assert!(!name.contains('+'));
        }
    }
}
