// gpkg-core/src/activation.rs
//! Pointing a component's base link (`active_prod` and friends) at an
//! installed version.

use std::fmt;
use std::path::{Path, PathBuf};

use gpkg_common::component::ComponentDescriptor;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::host::{HostSelector, HostTarget};
use gpkg_common::options::Options;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::version;
use crate::Context;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivationStatus {
    /// The link was created or moved.
    Updated { from: Option<String>, to: String },
    /// The link already pointed at the resolved version.
    Unchanged { version: String },
    /// The link points elsewhere and `force` was not given.
    Kept { current: String, available: String },
    /// Skipped during a fan-out because nothing matched.
    Missing { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationOutcome {
    pub host: String,
    pub component: String,
    pub basename: String,
    #[serde(flatten)]
    pub status: ActivationStatus,
}

impl ActivationOutcome {
    pub fn changed(&self) -> bool {
        matches!(self.status, ActivationStatus::Updated { .. })
    }
}

impl fmt::Display for ActivationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = format!("{} {:?} on {}", self.component, self.basename, self.host);
        match &self.status {
            ActivationStatus::Updated { to, .. } => write!(f, "{target} updated to {to}"),
            ActivationStatus::Unchanged { version } => {
                write!(f, "{target} already at {version}")
            }
            ActivationStatus::Kept { current, available } => write!(
                f,
                "{target} left at {current} ({available} available, use --force)"
            ),
            ActivationStatus::Missing { reason } => write!(f, "{target} skipped: {reason}"),
        }
    }
}

/// Activates `component` (every packaged component if `None`) on each host
/// the selector names. With more than one target, targets that do not exist
/// are recorded as `Missing` and skipped; any other error stops the run.
pub fn activate(
    ctx: &Context,
    selector: &HostSelector,
    component: Option<&ComponentDescriptor>,
    opts: &Options,
) -> Result<Vec<ActivationOutcome>> {
    let hosts = ctx.fleet.select(selector)?;
    if let HostSelector::Named(_) = selector {
        let mut outcomes = Vec::new();
        for host in &hosts {
            outcomes.extend(activate_host(ctx, host.as_ref(), component, opts)?);
        }
        return Ok(outcomes);
    }

    let mut outcomes = Vec::new();
    for host in &hosts {
        match activate_host(ctx, host.as_ref(), component, opts) {
            Ok(done) => outcomes.extend(done),
            Err(e) if e.is_not_exist() => {
                debug!("Nothing to activate on {}: {}", host.name(), e);
                outcomes.push(missing(host.as_ref(), component, opts, &e));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcomes)
}

/// Activates on a single host, expanding `None` to every packaged component
/// and components with related types to those types.
pub fn activate_host(
    ctx: &Context,
    host: &dyn HostTarget,
    component: Option<&ComponentDescriptor>,
    opts: &Options,
) -> Result<Vec<ActivationOutcome>> {
    let targets: Vec<&ComponentDescriptor> = match component {
        Some(c) if !c.has_related() => {
            return activate_component(host, c, opts).map(|o| vec![o]);
        }
        Some(c) => ctx.registry.related_to(c).collect(),
        None => ctx.registry.packaged().collect(),
    };

    let mut outcomes = Vec::new();
    for target in targets {
        match activate_component(host, target, opts) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) if e.is_not_exist() => {
                debug!("Skipping {} on {}: {}", target, host.name(), e);
                outcomes.push(missing(host, Some(target), opts, &e));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcomes)
}

fn missing(
    host: &dyn HostTarget,
    component: Option<&ComponentDescriptor>,
    opts: &Options,
    err: &GpkgError,
) -> ActivationOutcome {
    ActivationOutcome {
        host: host.name().to_string(),
        component: component.map_or("all", |c| c.name).to_string(),
        basename: opts.basename.clone(),
        status: ActivationStatus::Missing {
            reason: err.to_string(),
        },
    }
}

/// Names of the installed version directories under `dir`.
pub(crate) fn installed_versions(host: &dyn HostTarget, dir: &Path) -> Result<Vec<String>> {
    Ok(host
        .read_dir(dir)?
        .into_iter()
        .filter(|e| e.is_dir && !e.is_symlink && !e.name.starts_with('.'))
        .map(|e| e.name)
        .collect())
}

fn activate_component(
    host: &dyn HostTarget,
    component: &ComponentDescriptor,
    opts: &Options,
) -> Result<ActivationOutcome> {
    let basedir = host.component_dir(component);
    let not_installed = |requested: &str| {
        GpkgError::NotExist(format!(
            "{requested:?} version of {component} on {}",
            host.name()
        ))
    };

    debug!(
        "Checking {} {:?} on {} for version {:?}",
        component, opts.basename, host.name(), opts.version
    );
    let candidates = match installed_versions(host, &basedir) {
        Ok(names) => names,
        Err(e) if e.is_not_exist() => return Err(not_installed(&opts.version)),
        Err(e) => return Err(e),
    };
    let version = version::resolve(&candidates, &opts.version)
        .map_err(|_| not_installed(&opts.version))?;

    match host.stat(&basedir.join(&version))? {
        Some(stat) if stat.is_dir => {}
        _ => return Err(not_installed(&version)),
    }

    let link = basedir.join(&opts.basename);
    let existing = host
        .read_link(&link)?
        .map(|p| p.to_string_lossy().into_owned());
    let outcome = |status: ActivationStatus| ActivationOutcome {
        host: host.name().to_string(),
        component: component.name.to_string(),
        basename: opts.basename.clone(),
        status,
    };

    match existing.as_deref() {
        Some(current) if current == version => {
            debug!("{} already points at {}", link.display(), version);
            return Ok(outcome(ActivationStatus::Unchanged { version }));
        }
        Some(current) if !opts.force => {
            debug!("{} points at {}, not forced", link.display(), current);
            return Ok(outcome(ActivationStatus::Kept {
                current: current.to_string(),
                available: version,
            }));
        }
        _ => {}
    }

    swap_link(host, &basedir, &link, &version)?;
    info!(
        "{} {} on {} updated to {}",
        component,
        link.display(),
        host.name(),
        version
    );
    Ok(outcome(ActivationStatus::Updated {
        from: existing,
        to: version,
    }))
}

/// Replaces `link` with a symlink to `version` by renaming a freshly made
/// temporary link over it.
fn swap_link(host: &dyn HostTarget, basedir: &Path, link: &Path, version: &str) -> Result<()> {
    let basename = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp: PathBuf = basedir.join(format!(".{basename}.tmp-{}", Uuid::new_v4()));
    host.symlink(Path::new(version), &tmp)?;
    if let Err(e) = host.rename(&tmp, link) {
        if let Err(cleanup) = host.remove_file(&tmp) {
            warn!("Could not remove {}: {}", tmp.display(), cleanup);
        }
        return Err(e);
    }
    Ok(())
}
