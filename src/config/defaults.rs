//! Default configuration values

/// Name of the pipeline file looked up in the working directory
pub const PIPELINE_FILE_NAME: &str = "buildmill.toml";

/// Kit name assigned to targets created from a pipeline file
pub const DEFAULT_KIT: &str = "default";

/// Display name of the build configuration created from a pipeline file
pub const DEFAULT_BUILD_CONFIGURATION: &str = "Default";

/// Display name of the deploy configuration created from a pipeline file
pub const DEFAULT_DEPLOY_CONFIGURATION: &str = "Deploy";

/// Maximum substitution passes before macro expansion gives up
pub const MAX_EXPANSION_DEPTH: usize = 10;
