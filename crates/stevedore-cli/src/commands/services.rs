//! `stevedore services`: list services in dependency order.

use clap::Args;
use stevedore_compose::{Project, ServiceConfig};

/// Arguments for the `services` command.
#[derive(Args, Debug)]
pub struct ServicesArgs {
    /// Also show the image or build context of each service.
    #[arg(short, long)]
    pub long: bool,
}

/// Executes the `services` command.
///
/// # Errors
///
/// Returns an error if the services depend on each other in a cycle.
pub fn execute(project: &Project, args: &ServicesArgs) -> anyhow::Result<()> {
    let order = project
        .service_order()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if order.is_empty() {
        println!("No services defined.");
        return Ok(());
    }

    if !args.long {
        for name in &order {
            println!("{name}");
        }
        return Ok(());
    }

    println!("{:<24} {:<40}", "SERVICE", "SOURCE");
    for name in &order {
        let source = project.service(name).map_or_else(String::new, source_label);
        println!("{name:<24} {source:<40}");
    }
    Ok(())
}

/// Image reference, else build context, else `-`.
fn source_label(service: &ServiceConfig) -> String {
    if let Some(image) = &service.image {
        return image.clone();
    }
    match service.build.as_ref() {
        Some(build) => match build.context.as_deref() {
            Some(context) if build.is_remote() => format!("build (remote): {context}"),
            Some(context) => format!("build: {context}"),
            None => "-".to_owned(),
        },
        None => "-".to_owned(),
    }
}
