//! `stevedore config`: print the merged configuration.

use clap::Args;
use stevedore_compose::Project;

use crate::output::{ConfigDocument, OutputFormat, render};

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print only the service names, one per line.
    #[arg(long, conflicts_with = "volumes")]
    pub services: bool,

    /// Print only the volume names, one per line.
    #[arg(long)]
    pub volumes: bool,

    /// Output format of the full configuration.
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

/// Executes the `config` command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn execute(project: &Project, args: &ConfigArgs) -> anyhow::Result<()> {
    if args.services {
        for name in project.service_names() {
            println!("{name}");
        }
        return Ok(());
    }
    if args.volumes {
        for name in project.volumes().keys() {
            println!("{name}");
        }
        return Ok(());
    }

    let document = ConfigDocument::from_project(project);
    print!("{}", render(&document, args.format)?);
    Ok(())
}
