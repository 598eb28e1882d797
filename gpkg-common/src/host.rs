// gpkg-common/src/host.rs
//! The filesystem capabilities every install and activation step goes through.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::component::ComponentDescriptor;
use super::error::{GpkgError, Result};

pub const LOCALHOST: &str = "localhost";
pub const ALL_HOSTS: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub is_dir: bool,
    pub len: u64,
}

/// Filesystem operations on a host, local or remote.
///
/// Paths are absolute on the target host. Implementations report a missing
/// path as an io `NotFound` error unless the method says otherwise.
pub trait HostTarget: Send + Sync {
    fn name(&self) -> &str;

    fn is_local(&self) -> bool;

    /// The base install directory on this host.
    fn root(&self) -> &Path;

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>>;

    /// Follows symlinks. `None` if nothing exists at `path`.
    fn stat(&self, path: &Path) -> Result<Option<FileStat>>;

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()>;

    /// Creates (or truncates) `path` with `mode` and copies `contents` into
    /// it, returning the number of bytes written.
    fn write_file(&self, path: &Path, mode: u32, contents: &mut dyn Read) -> Result<u64>;

    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    /// The target of a symlink, or `None` if there is no symlink at `link`.
    fn read_link(&self, link: &Path) -> Result<Option<PathBuf>>;

    fn remove_file(&self, path: &Path) -> Result<()>;

    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Renames `from` over `to`, replacing a file or symlink at `to`.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.stat(path)?.is_some())
    }

    fn packages_dir(&self) -> PathBuf {
        self.root().join("packages")
    }

    /// `<root>/packages/<component>`
    fn component_dir(&self, component: &ComponentDescriptor) -> PathBuf {
        self.packages_dir().join(component.name)
    }
}

impl fmt::Debug for dyn HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.root().display())
    }
}

/// Which hosts an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSelector {
    All,
    Named(String),
}

impl HostSelector {
    pub fn parse(name: &str) -> Self {
        if name.is_empty() || name.eq_ignore_ascii_case(ALL_HOSTS) {
            Self::All
        } else {
            Self::Named(name.to_string())
        }
    }
}

impl fmt::Display for HostSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL_HOSTS),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// The configured hosts, in discovery order.
#[derive(Clone, Default)]
pub struct Fleet {
    hosts: Vec<Arc<dyn HostTarget>>,
}

impl Fleet {
    pub fn new(hosts: Vec<Arc<dyn HostTarget>>) -> Self {
        Self { hosts }
    }

    pub fn hosts(&self) -> &[Arc<dyn HostTarget>] {
        &self.hosts
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HostTarget>> {
        self.hosts
            .iter()
            .find(|h| h.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Expands a selector to concrete hosts. An unknown name is `NotExist`.
    pub fn select(&self, selector: &HostSelector) -> Result<Vec<Arc<dyn HostTarget>>> {
        match selector {
            HostSelector::All => Ok(self.hosts.clone()),
            HostSelector::Named(name) => self
                .get(name)
                .map(|h| vec![h])
                .ok_or_else(|| GpkgError::NotExist(format!("host {name:?}"))),
        }
    }
}

impl fmt::Debug for Fleet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hosts.iter().map(|h| h.name()))
            .finish()
    }
}
