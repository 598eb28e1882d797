// gpkg-core/src/unarchive.rs
//! Unpacking release archives into versioned package directories.
//!
//! Archives are untrusted. Entry names are cleaned and anything that would
//! land outside the new version directory is skipped; symlinks that point out
//! of the tree abort the whole unpack. Work happens in a hidden staging
//! directory which is only renamed into place once every entry is written.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use gpkg_common::component::ComponentDescriptor;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::host::HostTarget;
use gpkg_common::options::Options;
use gpkg_io::ownership;
use lazy_static::lazy_static;
use regex::Regex;
use tar::{Archive, EntryType};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::activation::{activate_host, ActivationOutcome};
use crate::version::is_plain_version;
use crate::Context;

lazy_static! {
    static ref ARCHIVE_RE: Regex =
        Regex::new(r"^geneos-(web-server|fixanalyser2-netprobe|file-agent|\w+)-([\w\.-]+?)[\.-]?linux")
            .unwrap();
}

const DIR_MODE: u32 = 0o775;

/// A version directory created by [`unarchive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub host: String,
    pub component: &'static str,
    pub version: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Unpacked {
    pub installed: InstalledVersion,
    pub activations: Vec<ActivationOutcome>,
}

/// Splits a release archive filename into its component fragment and version,
/// e.g. `geneos-web-server-6.1.0-linux-x64.tar.gz` into `web-server` and
/// `6.1.0`.
pub fn parse_archive_name(filename: &str) -> Option<(&str, &str)> {
    let caps = ARCHIVE_RE.captures(filename)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Works out which component and version an archive holds, from an explicit
/// `TYPE:VERSION` override or from the filename.
pub(crate) fn identify<'r>(
    ctx: &'r Context,
    requested: Option<&'r ComponentDescriptor>,
    filename: &str,
    opts: &Options,
) -> Result<(&'r ComponentDescriptor, String)> {
    if let Some(spec) = opts.override_spec.as_deref() {
        let (kind, version) = spec.split_once(':').ok_or_else(|| {
            GpkgError::InvalidArgs("type/version override must be in the form TYPE:VERSION".into())
        })?;
        let component = ctx.registry.require(kind)?;
        if component.has_related() {
            return Err(GpkgError::InvalidArgs(format!(
                "{component} packages are installed as one of {:?}",
                component.related
            )));
        }
        if !is_plain_version(version) {
            return Err(GpkgError::InvalidArgs(format!("invalid version {version:?}")));
        }
        return Ok((component, version.to_string()));
    }

    let (fragment, version) = parse_archive_name(filename).ok_or_else(|| {
        GpkgError::InvalidArgs(format!(
            "{filename:?} is not a release archive name, use an override"
        ))
    })?;
    let from_file = ctx.registry.from_archive_name(fragment).ok_or_else(|| {
        GpkgError::InvalidArgs(format!("unknown component {fragment:?} in {filename:?}"))
    })?;

    match requested {
        None => Ok((from_file, version.to_string())),
        Some(c) if c.has_related() => Ok((from_file, version.to_string())),
        Some(c) if c.name == from_file.name => Ok((c, version.to_string())),
        Some(c) => Err(GpkgError::InvalidArgs(format!(
            "{filename:?} is a {from_file} archive, not {c}"
        ))),
    }
}

/// Unpacks the gzipped tar stream `gz` on `host` and then points the base
/// link at it (subject to the usual force rules).
///
/// An existing directory for the same version is `AlreadyExists` and is left
/// untouched.
pub fn unarchive(
    ctx: &Context,
    host: &dyn HostTarget,
    requested: Option<&ComponentDescriptor>,
    filename: &str,
    gz: impl Read,
    opts: &Options,
) -> Result<Unpacked> {
    let (component, version) = identify(ctx, requested, filename, opts)?;
    let basedir = check_not_installed(host, component, &version)?;
    let component_dir = host.component_dir(component);

    let staging = component_dir.join(format!(".{version}.partial-{}", Uuid::new_v4()));
    debug!("Unpacking {} into {}", filename, staging.display());
    host.create_dir_all(&staging, DIR_MODE)?;

    let unpacked = extract_entries(host, component, &staging, gz)
        .and_then(|()| host.rename(&staging, &basedir));
    if let Err(e) = unpacked {
        if let Err(cleanup) = host.remove_dir_all(&staging) {
            warn!("Could not remove {}: {}", staging.display(), cleanup);
        }
        return Err(e);
    }

    if host.is_local() && ownership::is_superuser() {
        reown(ctx, &basedir);
    }

    println!("installed {:?} to {:?} on {}", filename, basedir, host.name());
    let installed = InstalledVersion {
        host: host.name().to_string(),
        component: component.name,
        version: version.clone(),
        path: basedir,
    };
    let activations = activate_host(ctx, host, Some(component), &opts.with_version(version))?;
    Ok(Unpacked {
        installed,
        activations,
    })
}

/// The directory `version` would be unpacked into, or `AlreadyExists` if it
/// is already there.
pub(crate) fn check_not_installed(
    host: &dyn HostTarget,
    component: &ComponentDescriptor,
    version: &str,
) -> Result<PathBuf> {
    let basedir = host.component_dir(component).join(version);
    if host.exists(&basedir)? {
        return Err(GpkgError::AlreadyExists(format!(
            "{component} {version} on {}",
            host.name()
        )));
    }
    Ok(basedir)
}

fn reown(ctx: &Context, basedir: &Path) {
    let Some(user) = ctx.config.default_user.as_deref() else {
        debug!("No default user configured, leaving {} owned by root", basedir.display());
        return;
    };
    let result = ownership::lookup_user(user)
        .and_then(|(uid, gid)| ownership::chown_tree(basedir, uid, gid));
    if let Err(e) = result {
        warn!("Cannot change ownership of {} to {}: {}", basedir.display(), user, e);
    }
}

fn extract_entries(
    host: &dyn HostTarget,
    component: &ComponentDescriptor,
    root: &Path,
    gz: impl Read,
) -> Result<()> {
    let mut archive = Archive::new(GzDecoder::new(gz));
    let mut links = LinkTree::default();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_name = entry.path()?.to_string_lossy().into_owned();
        let stripped = component.strip_entry(&raw_name);
        if stripped.is_empty() {
            continue;
        }
        let Some(relative) = clean_relative(Path::new(stripped)) else {
            warn!("Skipping archive entry {:?} outside the package tree", raw_name);
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let integrity = |msg: String| GpkgError::IntegrityViolation(format!("{raw_name:?}: {msg}"));
        let header = entry.header();
        let mode = header.mode()? & 0o7777;
        let kind = header.entry_type();

        match kind {
            EntryType::Regular | EntryType::Continuous => {
                let expected = header.size()?;
                let fullpath = root.join(links.resolve(&relative).map_err(integrity)?);
                if let Some(parent) = fullpath.parent() {
                    host.create_dir_all(parent, DIR_MODE)?;
                }
                let written = host.write_file(&fullpath, mode, &mut entry)?;
                if written != expected {
                    return Err(GpkgError::IntegrityViolation(format!(
                        "{raw_name:?}: wrote {written} of {expected} bytes"
                    )));
                }
            }
            EntryType::Directory => {
                let fullpath = root.join(links.resolve(&relative).map_err(integrity)?);
                // the owner has to be able to fill it
                host.create_dir_all(&fullpath, mode | 0o700)?;
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name()?
                    .map(|t| t.into_owned())
                    .ok_or_else(|| integrity("symlink without target".into()))?;
                let at = links.check_link(&relative, &target).map_err(integrity)?;
                let fullpath = root.join(&at);
                if let Some(parent) = fullpath.parent() {
                    host.create_dir_all(parent, DIR_MODE)?;
                }
                if host.read_link(&fullpath)?.is_none() && !host.exists(&fullpath)? {
                    host.symlink(&target, &fullpath)?;
                    links.insert(at, target);
                }
            }
            other => warn!("Unsupported archive entry type {:?} for {:?}", other, raw_name),
        }
    }
    Ok(())
}

/// Lexically cleans a relative entry path. A leading `/` is dropped; `None`
/// if `..` would climb above the start.
fn clean_relative(path: &Path) -> Option<PathBuf> {
    let mut cleaned = PathBuf::new();
    for part in path.components() {
        match part {
            Component::Normal(p) => cleaned.push(p),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    return None;
                }
            }
            Component::Prefix(_) => return None,
        }
    }
    Some(cleaned)
}

const MAX_LINK_HOPS: usize = 40;

/// The symlinks an unpack has created so far, keyed by their location
/// relative to the version root. Paths are resolved through them the way the
/// kernel would, so a chain of individually harmless links cannot climb out.
#[derive(Debug, Default)]
struct LinkTree {
    links: HashMap<PathBuf, PathBuf>,
}

impl LinkTree {
    fn insert(&mut self, at: PathBuf, target: PathBuf) {
        self.links.insert(at, target);
    }

    /// Resolves `path` against the version root, following known links in
    /// every component including the last.
    fn resolve(&self, path: &Path) -> std::result::Result<PathBuf, String> {
        let mut resolved = PathBuf::new();
        let mut pending: Vec<OsString> = path
            .components()
            .rev()
            .map(|c| c.as_os_str().to_owned())
            .collect();
        let mut hops = 0;
        while let Some(part) = pending.pop() {
            match Path::new(&part).components().next() {
                None | Some(Component::CurDir) => {}
                Some(Component::ParentDir) => {
                    if !resolved.pop() {
                        return Err(format!("{} leaves the package", path.display()));
                    }
                }
                Some(Component::Normal(name)) => {
                    resolved.push(name);
                    if let Some(target) = self.links.get(&resolved) {
                        hops += 1;
                        if hops > MAX_LINK_HOPS {
                            return Err(format!("too many levels of symlinks in {}", path.display()));
                        }
                        resolved.pop();
                        pending.extend(target.components().rev().map(|c| c.as_os_str().to_owned()));
                    }
                }
                Some(Component::RootDir | Component::Prefix(_)) => {
                    return Err(format!("{} resolves to an absolute path", path.display()));
                }
            }
        }
        Ok(resolved)
    }

    /// Checks a symlink entry at `link` pointing at `target` and returns the
    /// resolved location to create it at.
    fn check_link(&self, link: &Path, target: &Path) -> std::result::Result<PathBuf, String> {
        if target.is_absolute() {
            return Err(format!("absolute symlink target {}", target.display()));
        }
        let parent = self.resolve(link.parent().unwrap_or_else(|| Path::new("")))?;
        let Some(name) = link.file_name() else {
            return Err(format!("symlink {} has no name", link.display()));
        };
        self.resolve(&parent.join(target)).map_err(|_| {
            format!("symlink target {} leaves the package", target.display())
        })?;
        Ok(parent.join(name))
    }
}
