// gpkg/src/cli/install.rs

use clap::Args;
use colored::Colorize;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::options::{Options, DEFAULT_BASENAME};
use gpkg_core::install::check_install_options;
use gpkg_core::{install, InstallStatus, RolloutCoordinator};
use tracing::instrument;

use crate::cli::{SourceArgs, TargetArgs};
use crate::instances::LocalInstances;

#[derive(Debug, Args)]
pub struct InstallArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[command(flatten)]
    source: SourceArgs,

    /// Archive file, URL, directory of archives, or "-" for stdin
    #[arg(short = 'f', long = "source", value_name = "FILE|URL|DIR")]
    archive: Option<String>,

    /// Base link to point at the new version
    #[arg(short, long, default_value = DEFAULT_BASENAME)]
    base: String,

    /// Only use archives already in the downloads directory
    #[arg(short = 'L', long)]
    local: bool,

    /// Stream downloads instead of keeping them
    #[arg(short, long)]
    nosave: bool,

    /// Component and version for archives with non-standard names
    #[arg(short = 'T', long = "override", value_name = "TYPE:VERSION")]
    override_spec: Option<String>,

    /// Move the base link to the new version, restarting instances using it
    #[arg(short = 'U', long)]
    update: bool,

    /// Also update links used by protected instances (implies --update)
    #[arg(short = 'F', long)]
    force: bool,
}

impl InstallArgs {
    fn options(&self) -> Options {
        let update = self.update || self.force;
        self.source.apply(Options {
            basename: self.base.clone(),
            force: self.force,
            restart: update,
            local_only: self.local,
            no_save: self.nosave,
            override_spec: self.override_spec.clone(),
            source: self.archive.clone(),
            update,
            ..Options::default()
        })
    }

    #[instrument(skip(self, ctx), fields(component = ?self.target.component, host = %self.target.host))]
    pub fn run(&self, ctx: &gpkg_core::Context) -> Result<()> {
        let opts = self.options();
        check_install_options(&opts)?;
        let component = self.target.component(ctx)?;

        let control = LocalInstances::new(ctx);
        let coordinator = RolloutCoordinator::new(ctx, &control);
        let outcomes = install(
            ctx,
            &self.target.selector(),
            component,
            &opts,
            opts.update.then_some(&coordinator),
        )?;

        let mut failed = 0;
        for outcome in &outcomes {
            match &outcome.status {
                InstallStatus::Installed { .. } => println!("{}", outcome.to_string().green()),
                InstallStatus::Skipped { .. } => println!("{}", outcome.to_string().dimmed()),
                InstallStatus::Blocked { .. } => println!("{}", outcome.to_string().yellow()),
                InstallStatus::Failed { .. } => println!("{}", outcome.to_string().red()),
            }
            for activation in outcome.activations.iter().filter(|a| a.changed()) {
                println!("  {activation}");
            }
            if let Some(report) = &outcome.rollout {
                super::update::print_instance_failures(report);
            }
            if outcome.is_failure() {
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(GpkgError::Generic(format!(
                "{failed} of {} installs did not complete",
                outcomes.len()
            )));
        }
        Ok(())
    }
}
