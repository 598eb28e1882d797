// gpkg-core/src/install.rs
//! Installing release archives across the fleet.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use gpkg_common::component::ComponentDescriptor;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::host::{HostSelector, HostTarget};
use gpkg_common::options::Options;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::activation::ActivationOutcome;
use crate::archive::open_archive;
use crate::rollout::{RolloutCoordinator, RolloutReport};
use crate::unarchive::{check_not_installed, identify, unarchive, InstalledVersion};
use crate::Context;

const COMPONENT_DIR_MODE: u32 = 0o775;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallStatus {
    Installed { version: String, path: PathBuf },
    /// Already installed, or no archive to install from.
    Skipped { reason: String },
    Failed { error: String },
    /// Held back by the rollout guard; nothing was unpacked.
    Blocked { warning: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub host: String,
    pub component: String,
    #[serde(flatten)]
    pub status: InstallStatus,
    pub activations: Vec<ActivationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout: Option<RolloutReport>,
}

impl InstallOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, InstallStatus::Failed { .. })
            || self.rollout.as_ref().is_some_and(|r| r.has_failures())
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}: ", self.component, self.host)?;
        match &self.status {
            InstallStatus::Installed { version, .. } => write!(f, "installed {version}"),
            InstallStatus::Skipped { reason } => write!(f, "skipped ({reason})"),
            InstallStatus::Failed { error } => write!(f, "failed: {error}"),
            InstallStatus::Blocked { warning } => write!(f, "not installed: {warning}"),
        }
    }
}

/// Installs `component` (every packaged component if `None`) on each
/// selected host and reports what happened per host and component.
///
/// A failure on one target is recorded and the rest are still attempted.
/// With `opts.update` each unpack is wrapped in `rollout` so the base link
/// moves (forcefully) with the affected instances stopped.
pub fn install(
    ctx: &Context,
    selector: &HostSelector,
    component: Option<&ComponentDescriptor>,
    opts: &Options,
    rollout: Option<&RolloutCoordinator<'_>>,
) -> Result<Vec<InstallOutcome>> {
    let hosts = ctx.fleet.select(selector)?;
    let targets: Vec<&ComponentDescriptor> = match component {
        Some(c) => vec![c],
        None => ctx.registry.packaged().collect(),
    };

    let mut outcomes = Vec::new();
    for host in &hosts {
        for target in &targets {
            let outcome = install_target(ctx, host, target, opts, rollout);
            match &outcome.status {
                InstallStatus::Failed { error } => {
                    error!("Install of {} on {} failed: {}", target, host.name(), error)
                }
                InstallStatus::Blocked { warning } => warn!("{}", warning),
                status => debug!("{} on {}: {:?}", target, host.name(), status),
            }
            outcomes.push(outcome);
        }
    }
    Ok(outcomes)
}

fn install_target(
    ctx: &Context,
    host: &Arc<dyn HostTarget>,
    target: &ComponentDescriptor,
    opts: &Options,
    rollout: Option<&RolloutCoordinator<'_>>,
) -> InstallOutcome {
    let mut outcome = InstallOutcome {
        host: host.name().to_string(),
        component: target.name.to_string(),
        status: InstallStatus::Skipped {
            reason: String::new(),
        },
        activations: Vec::new(),
        rollout: None,
    };

    let result = unpack_on(ctx, host, target, opts, rollout);
    outcome.status = match result {
        Ok((Some(installed), activations, report)) => {
            info!("Installed {} {} on {}", installed.component, installed.version, installed.host);
            outcome.component = installed.component.to_string();
            outcome.activations = activations;
            outcome.rollout = report;
            InstallStatus::Installed {
                version: installed.version,
                path: installed.path,
            }
        }
        Ok((None, _, report)) => {
            let warning = report
                .as_ref()
                .and_then(|r| r.warning.clone())
                .unwrap_or_else(|| "nothing installed".to_string());
            outcome.rollout = report;
            InstallStatus::Blocked { warning }
        }
        Err(e) if e.is_already_exists() => InstallStatus::Skipped {
            reason: e.to_string(),
        },
        Err(e) if e.is_not_exist() => InstallStatus::Skipped {
            reason: e.to_string(),
        },
        Err(e) => InstallStatus::Failed {
            error: e.to_string(),
        },
    };
    outcome
}

type Unpack = (Option<InstalledVersion>, Vec<ActivationOutcome>, Option<RolloutReport>);

fn unpack_on(
    ctx: &Context,
    host: &Arc<dyn HostTarget>,
    target: &ComponentDescriptor,
    opts: &Options,
    rollout: Option<&RolloutCoordinator<'_>>,
) -> Result<Unpack> {
    if !target.has_related() {
        host.create_dir_all(&host.component_dir(target), COMPONENT_DIR_MODE)?;
    }
    let archive = open_archive(&ctx.config, target, opts)?;
    debug!("Installing {} from {}", archive.filename, archive.origin);

    let requested = Some(target);
    match (opts.update, rollout) {
        (true, Some(coordinator)) => {
            // nothing to roll out for a version that is already unpacked
            let (component, version) = identify(ctx, requested, &archive.filename, opts)?;
            check_not_installed(host.as_ref(), component, &version)?;

            let forced = opts.with_force(true);
            let mut installed = None;
            let report = coordinator.around(std::slice::from_ref(host), requested, opts, || {
                let unpacked = unarchive(
                    ctx,
                    host.as_ref(),
                    requested,
                    &archive.filename,
                    archive.reader,
                    &forced,
                )?;
                installed = Some(unpacked.installed);
                Ok(unpacked.activations)
            })?;
            let activations = report.activations.clone();
            Ok((installed, activations, Some(report)))
        }
        (update, _) => {
            let opts = if update {
                opts.with_force(true)
            } else {
                opts.clone()
            };
            let unpacked = unarchive(
                ctx,
                host.as_ref(),
                requested,
                &archive.filename,
                archive.reader,
                &opts,
            )?;
            Ok((Some(unpacked.installed), unpacked.activations, None))
        }
    }
}

/// Refuses the pinned-version-with-platform combination up front so a fleet
/// wide install fails once instead of per target.
pub fn check_install_options(opts: &Options) -> Result<()> {
    if opts.source.is_none() && !opts.local_only && !opts.is_latest() && opts.platform().is_some() {
        return Err(GpkgError::InvalidArgs(
            "a platform cannot be combined with an explicit version".into(),
        ));
    }
    Ok(())
}
