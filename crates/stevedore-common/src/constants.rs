//! Workspace-wide constants and default file names.

/// Default manifest file looked up in the working directory.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// Override manifest applied after the default one when present.
pub const DEFAULT_OVERRIDE_FILE: &str = "docker-compose.override.yml";

/// File holding default values for variable interpolation.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Environment variable selecting manifest files, separated by the platform
/// path separator.
pub const COMPOSE_FILE_ENV: &str = "COMPOSE_FILE";

/// Environment variable overriding the project name.
pub const COMPOSE_PROJECT_NAME_ENV: &str = "COMPOSE_PROJECT_NAME";

/// Service fields replaced wholesale on merge instead of concatenated.
pub const NON_MERGEABLE_FIELDS: &[&str] = &["links", "volumes_from"];

/// Restart policies accepted by the container engine.
pub const RESTART_POLICIES: &[&str] = &["no", "always", "unless-stopped", "on-failure"];
