// gpkg/src/cli/update.rs
//! Contains the logic for the `update` command.

use clap::Args;
use colored::Colorize;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::options::{Options, DEFAULT_BASENAME, LATEST};
use gpkg_core::{Context, RolloutCoordinator, RolloutReport};
use tracing::instrument;

use crate::cli::TargetArgs;
use crate::instances::LocalInstances;

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Installed version to switch to
    #[arg(value_name = "VERSION", default_value = LATEST)]
    version: String,

    /// Base link to move
    #[arg(short, long, default_value = DEFAULT_BASENAME)]
    base: String,

    /// Stop instances using the link first and start them again afterwards (the default)
    #[arg(short = 'R', long, overrides_with = "no_restart")]
    restart: bool,

    /// Move the link under running instances without stopping them
    #[arg(long, overrides_with = "restart")]
    no_restart: bool,

    /// Move the link even if protected instances use it
    #[arg(short = 'F', long)]
    force: bool,
}

impl UpdateArgs {
    fn restarts(&self) -> bool {
        self.restart || !self.no_restart
    }

    #[instrument(skip(self, ctx), fields(component = ?self.target.component, version = %self.version))]
    pub fn run(&self, ctx: &Context) -> Result<()> {
        let opts = Options {
            version: self.version.clone(),
            basename: self.base.clone(),
            restart: self.restarts(),
            force: self.force,
            ..Options::default()
        };
        let component = self.target.component(ctx)?;

        let control = LocalInstances::new(ctx);
        let report = RolloutCoordinator::new(ctx, &control).update(
            &self.target.selector(),
            component,
            &opts,
        )?;

        for activation in &report.activations {
            if activation.changed() {
                println!("{}", activation.to_string().green());
            } else {
                tracing::debug!("{}", activation);
            }
        }
        for instance in &report.restarted {
            println!("restarted {instance}");
        }
        if let Some(warning) = &report.warning {
            println!("{} {}", "Warning:".yellow().bold(), warning);
        }
        print_instance_failures(&report);

        if report.has_failures() {
            return Err(GpkgError::Generic(format!(
                "{} instance(s) could not be stopped or restarted",
                report.stop_failures.len() + report.restart_failures.len()
            )));
        }
        Ok(())
    }
}

pub fn print_instance_failures(report: &RolloutReport) {
    for failure in &report.stop_failures {
        eprintln!("{} could not stop {}", "Error:".red().bold(), failure);
    }
    for failure in &report.restart_failures {
        eprintln!("{} could not restart {}", "Error:".red().bold(), failure);
    }
}
