//! CLI command definitions and dispatch.

pub mod config;
pub mod services;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use stevedore_common::constants::{
    COMPOSE_FILE_ENV, COMPOSE_PROJECT_NAME_ENV, DEFAULT_COMPOSE_FILE, DEFAULT_OVERRIDE_FILE,
};
use stevedore_compose::interpolation::UndefinedVariablePolicy;
use stevedore_compose::{ParseOptions, Project, ProjectContext};

/// Stevedore: compose manifest loader and merge engine.
#[derive(Parser, Debug)]
#[command(name = "stevedore", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Compose file to load; repeat to merge several in order.
    #[arg(short = 'f', long = "file", global = true)]
    pub files: Vec<PathBuf>,

    /// Project name (defaults to the directory of the first file).
    #[arg(short = 'p', long, global = true, env = COMPOSE_PROJECT_NAME_ENV)]
    pub project_name: Option<String>,

    /// Leave `$VAR` references untouched.
    #[arg(long, global = true)]
    pub no_interpolate: bool,

    /// Fail on references to undefined variables.
    #[arg(long, global = true)]
    pub strict_env: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the merged configuration.
    Config(config::ConfigArgs),
    /// List services in dependency order.
    Services(services::ServicesArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if loading the project or the command itself fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let project = load_project(&cli)?;
    match cli.command {
        Command::Config(args) => config::execute(&project, &args),
        Command::Services(args) => services::execute(&project, &args),
    }
}

/// Builds and loads the project selected by the global flags.
///
/// # Errors
///
/// Returns an error if no manifest is found or any manifest fails to merge.
pub fn load_project(cli: &Cli) -> anyhow::Result<Project> {
    let files = compose_files(&cli.files, std::env::var_os(COMPOSE_FILE_ENV), Path::new("."));
    if files.is_empty() {
        anyhow::bail!("no {DEFAULT_COMPOSE_FILE} found in the current directory; pass one with -f");
    }

    let mut context = ProjectContext::new().options(parse_options(cli));
    if let Some(name) = &cli.project_name {
        context = context.project_name(name.as_str());
    }
    for file in files {
        context = context.file(file);
    }

    let mut project = Project::from_context(context).context("failed to create project")?;
    project.load().context("failed to load compose files")?;
    tracing::info!(project = project.name(), services = project.services().len(), "project loaded");
    Ok(project)
}

fn parse_options(cli: &Cli) -> ParseOptions {
    let undefined = if cli.strict_env {
        UndefinedVariablePolicy::Error
    } else {
        UndefinedVariablePolicy::Empty
    };
    ParseOptions::default()
        .interpolate(!cli.no_interpolate)
        .undefined(undefined)
}

/// Picks the manifests to load.
///
/// Explicit `-f` flags win, then `COMPOSE_FILE`, then the default file and
/// its override when they exist in `dir`.
fn compose_files(
    explicit: &[PathBuf],
    from_env: Option<std::ffi::OsString>,
    dir: &Path,
) -> Vec<PathBuf> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    if let Some(value) = from_env.filter(|v| !v.is_empty()) {
        return std::env::split_paths(&value).collect();
    }
    let default = dir.join(DEFAULT_COMPOSE_FILE);
    if !default.exists() {
        return Vec::new();
    }
    let mut files = vec![default];
    let override_file = dir.join(DEFAULT_OVERRIDE_FILE);
    if override_file.exists() {
        files.push(override_file);
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_files_win() {
        let files = compose_files(
            &[PathBuf::from("a.yml")],
            Some("b.yml".into()),
            Path::new("."),
        );
        assert_eq!(files, vec![PathBuf::from("a.yml")]);
    }

    #[test]
    fn compose_file_env_is_split() {
        let joined = std::env::join_paths(["a.yml", "b.yml"]).expect("joinable");
        let files = compose_files(&[], Some(joined), Path::new("."));
        assert_eq!(files, vec![PathBuf::from("a.yml"), PathBuf::from("b.yml")]);
    }

    #[test]
    fn defaults_include_override_when_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(compose_files(&[], None, dir.path()).is_empty());

        std::fs::write(dir.path().join(DEFAULT_COMPOSE_FILE), "services: {}").expect("write");
        assert_eq!(compose_files(&[], None, dir.path()).len(), 1);

        std::fs::write(dir.path().join(DEFAULT_OVERRIDE_FILE), "services: {}").expect("write");
        let files = compose_files(&[], None, dir.path());
        assert_eq!(files.len(), 2);
        assert!(files[1].ends_with(DEFAULT_OVERRIDE_FILE));
    }

    #[test]
    fn flags_map_to_parse_options() {
        let cli = Cli::parse_from(["stevedore", "--no-interpolate", "--strict-env", "services"]);
        let options = parse_options(&cli);
        assert!(!options.interpolate);
        assert_eq!(options.undefined, UndefinedVariablePolicy::Error);
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from([
            "stevedore", "config", "-f", "a.yml", "-f", "b.yml", "-p", "demo",
        ]);
        assert_eq!(cli.files, vec![PathBuf::from("a.yml"), PathBuf::from("b.yml")]);
        assert_eq!(cli.project_name.as_deref(), Some("demo"));
    }
}
