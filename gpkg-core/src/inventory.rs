// gpkg-core/src/inventory.rs
use std::path::PathBuf;

use gpkg_common::component::ComponentDescriptor;
use gpkg_common::error::Result;
use gpkg_common::host::{HostSelector, HostTarget};
use serde::Serialize;
use tracing::debug;

use crate::activation::installed_versions;
use crate::version::parse_version;
use crate::Context;

/// One installed version directory and the base links pointing at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    pub host: String,
    pub component: String,
    pub version: String,
    pub path: PathBuf,
    pub links: Vec<String>,
}

/// Lists installed versions for `component` (every packaged component if
/// `None`) on the selected hosts, oldest first within each component.
pub fn list_installed(
    ctx: &Context,
    selector: &HostSelector,
    component: Option<&ComponentDescriptor>,
) -> Result<Vec<InstalledPackage>> {
    let hosts = ctx.fleet.select(selector)?;
    let targets: Vec<&ComponentDescriptor> = match component {
        Some(c) if c.has_related() => ctx.registry.related_to(c).collect(),
        Some(c) => vec![c],
        None => ctx.registry.packaged().collect(),
    };

    let mut packages = Vec::new();
    for host in &hosts {
        for target in &targets {
            match list_component(host.as_ref(), target) {
                Ok(found) => packages.extend(found),
                Err(e) if e.is_not_exist() => {
                    debug!("No {} packages on {}", target, host.name());
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(packages)
}

fn list_component(host: &dyn HostTarget, component: &ComponentDescriptor) -> Result<Vec<InstalledPackage>> {
    let dir = host.component_dir(component);
    let entries = host.read_dir(&dir)?;

    let mut links = Vec::new();
    for entry in entries.iter().filter(|e| e.is_symlink) {
        if let Some(target) = host.read_link(&dir.join(&entry.name))? {
            links.push((entry.name.clone(), target.to_string_lossy().into_owned()));
        }
    }

    let mut versions = installed_versions(host, &dir)?;
    versions.sort_by(|a, b| parse_version(a).cmp(&parse_version(b)).then_with(|| a.cmp(b)));

    Ok(versions
        .into_iter()
        .map(|version| {
            let mut pointing: Vec<String> = links
                .iter()
                .filter(|(_, target)| *target == version)
                .map(|(name, _)| name.clone())
                .collect();
            pointing.sort();
            InstalledPackage {
                host: host.name().to_string(),
                component: component.name.to_string(),
                path: dir.join(&version),
                version,
                links: pointing,
            }
        })
        .collect())
}
