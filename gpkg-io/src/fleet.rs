// gpkg-io/src/fleet.rs
//! Builds the host fleet: the local host first, then any remote hosts listed
//! in the fleet file.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use gpkg_common::config::Config;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::host::{Fleet, HostTarget, LOCALHOST};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::host::{LocalHost, SshHost};

const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Install root on the remote host.
    pub geneos: PathBuf,
}

pub fn load_fleet(config: &Config) -> Result<Fleet> {
    let entries = match &config.hosts_file {
        Some(path) => match fs::read_to_string(path) {
            Ok(text) => {
                debug!("Loading fleet from {}", path.display());
                parse_hosts(&text)?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No fleet file at {}, local host only", path.display());
                Vec::new()
            }
            Err(e) => return Err(GpkgError::from(e)),
        },
        None => Vec::new(),
    };
    Ok(build_fleet(config, entries))
}

pub fn parse_hosts(text: &str) -> Result<Vec<HostEntry>> {
    serde_json::from_str(text)
        .map_err(|e| GpkgError::Config(format!("invalid hosts file: {e}")))
}

pub fn build_fleet(config: &Config, entries: Vec<HostEntry>) -> Fleet {
    let mut hosts: Vec<Arc<dyn HostTarget>> =
        vec![Arc::new(LocalHost::new(config.geneos_root()))];
    for entry in entries {
        if entry.name.eq_ignore_ascii_case(LOCALHOST) {
            warn!("Ignoring fleet entry named {:?}, it is reserved", entry.name);
            continue;
        }
        if hosts.iter().any(|h| h.name().eq_ignore_ascii_case(&entry.name)) {
            warn!("Duplicate fleet entry {:?} ignored", entry.name);
            continue;
        }
        hosts.push(Arc::new(SshHost::new(
            entry.name,
            entry.hostname,
            entry.username,
            entry.port.unwrap_or(DEFAULT_SSH_PORT),
            entry.geneos,
        )));
    }
    Fleet::new(hosts)
}
