// gpkg/src/instances.rs
//! Instances configured under the local Geneos directory.
//!
//! Each instance lives in `<root>/<type>/<type>s/<name>/` with an
//! `instance.json` describing it and an `instance.pid` written when gpkg (or
//! anything else) starts it. Remote hosts have no instances as far as this
//! controller is concerned.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use gpkg_common::error::{GpkgError, Result};
use gpkg_common::host::LOCALHOST;
use gpkg_common::instance::{Instance, InstanceControl, SignalOutcome, StopSignal};
use gpkg_common::options::DEFAULT_BASENAME;
use gpkg_core::Context;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use tracing::{debug, info, warn};

const INSTANCE_FILE: &str = "instance.json";
const PID_FILE: &str = "instance.pid";
const LOG_FILE: &str = "instance.log";

#[derive(Debug, Deserialize)]
struct InstanceFile {
    #[serde(rename = "version", default = "default_basename")]
    basename: String,
    #[serde(default)]
    pkgtype: Option<String>,
    #[serde(default)]
    protected: bool,
    /// Program and arguments, relative to the instance directory.
    #[serde(default)]
    start: Vec<String>,
}

fn default_basename() -> String {
    DEFAULT_BASENAME.to_string()
}

pub struct LocalInstances {
    root: PathBuf,
    components: Vec<&'static str>,
}

impl LocalInstances {
    pub fn new(ctx: &Context) -> Self {
        Self {
            root: ctx.config.geneos_root().to_path_buf(),
            components: ctx.registry.all().map(|c| c.name).collect(),
        }
    }

    fn type_dir(&self, component: &str) -> PathBuf {
        self.root.join(component).join(format!("{component}s"))
    }

    fn instance_dir(&self, instance: &Instance) -> PathBuf {
        self.type_dir(&instance.component).join(&instance.name)
    }

    fn read_config(dir: &Path) -> Result<InstanceFile> {
        let text = fs::read_to_string(dir.join(INSTANCE_FILE))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn pid(&self, instance: &Instance) -> Result<Option<Pid>> {
        let path = self.instance_dir(instance).join(PID_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => match text.trim().parse::<i32>() {
                Ok(pid) if pid > 0 => Ok(Some(Pid::from_raw(pid))),
                _ => {
                    warn!("Ignoring malformed pid file {}", path.display());
                    Ok(None)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl InstanceControl for LocalInstances {
    fn instances(&self, host: &str) -> Result<Vec<Instance>> {
        if !host.eq_ignore_ascii_case(LOCALHOST) {
            debug!("No instance control for {}", host);
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for component in &self.components {
            let type_dir = self.type_dir(component);
            let entries = match fs::read_dir(&type_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries.flatten() {
                let dir = entry.path();
                if !dir.join(INSTANCE_FILE).is_file() {
                    continue;
                }
                let config = match Self::read_config(&dir) {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("Skipping instance in {}: {}", dir.display(), e);
                        continue;
                    }
                };
                found.push(Instance {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    component: component.to_string(),
                    host: LOCALHOST.to_string(),
                    basename: config.basename,
                    pkgtype: config.pkgtype,
                    protected: config.protected,
                });
            }
        }
        found.sort_by(|a, b| a.component.cmp(&b.component).then_with(|| a.name.cmp(&b.name)));
        Ok(found)
    }

    fn is_running(&self, instance: &Instance) -> Result<bool> {
        let Some(pid) = self.pid(instance)? else {
            return Ok(false);
        };
        match kill(pid, None) {
            Ok(()) | Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn signal(&self, instance: &Instance, signal: StopSignal) -> Result<SignalOutcome> {
        let Some(pid) = self.pid(instance)? else {
            return Ok(SignalOutcome::ProcessGone);
        };
        let sig = match signal {
            StopSignal::Terminate => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        };
        debug!("Sending {:?} to {} (pid {})", sig, instance, pid);
        match kill(pid, sig) {
            Ok(()) => Ok(SignalOutcome::Delivered),
            Err(Errno::ESRCH) => Ok(SignalOutcome::ProcessGone),
            Err(Errno::EPERM) => Ok(SignalOutcome::NotPermitted),
            Err(e) => Err(e.into()),
        }
    }

    fn start(&self, instance: &Instance) -> Result<()> {
        let dir = self.instance_dir(instance);
        let config = Self::read_config(&dir)?;
        let (program, args) = config.start.split_first().ok_or_else(|| {
            GpkgError::Config(format!("{instance} has no start command in {INSTANCE_FILE}"))
        })?;

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))?;
        let child = Command::new(program)
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log)
            .spawn()?;

        fs::write(dir.join(PID_FILE), child.id().to_string())?;
        info!("Started {} with pid {}", instance, child.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gpkg_common::{ComponentRegistry, Config, Fleet};
    use gpkg_io::LocalHost;

    use super::*;

    fn setup() -> (tempfile::TempDir, LocalInstances) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(
            Config::with_root(dir.path()),
            ComponentRegistry::standard(),
            Fleet::new(vec![Arc::new(LocalHost::new(dir.path()))]),
        );
        (dir, LocalInstances::new(&ctx))
    }

    fn write_instance(root: &Path, component: &str, name: &str, json: &str) -> PathBuf {
        let dir = root.join(component).join(format!("{component}s")).join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(INSTANCE_FILE), json).unwrap();
        dir
    }

    #[test]
    fn reads_instances_from_the_type_directories() {
        let (dir, control) = setup();
        write_instance(dir.path(), "gateway", "gw1", r#"{"version":"active_dev","protected":true}"#);
        write_instance(dir.path(), "san", "probe1", r#"{"pkgtype":"netprobe"}"#);
        fs::create_dir_all(dir.path().join("gateway/gateways/not-an-instance")).unwrap();

        let found = control.instances("localhost").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "gw1");
        assert_eq!(found[0].basename, "active_dev");
        assert!(found[0].protected);
        assert_eq!(found[1].component, "san");
        assert_eq!(found[1].basename, "active_prod");
        assert!(found[1].uses("netprobe", "active_prod"));

        assert!(control.instances("remote1").unwrap().is_empty());
    }

    #[test]
    fn pid_file_decides_whether_it_runs() {
        let (dir, control) = setup();
        let inst_dir = write_instance(dir.path(), "gateway", "gw1", "{}");
        let gw1 = control.instances("localhost").unwrap().remove(0);

        assert!(!control.is_running(&gw1).unwrap());
        assert_eq!(
            control.signal(&gw1, StopSignal::Terminate).unwrap(),
            SignalOutcome::ProcessGone
        );

        fs::write(inst_dir.join(PID_FILE), std::process::id().to_string()).unwrap();
        assert!(control.is_running(&gw1).unwrap());

        fs::write(inst_dir.join(PID_FILE), i32::MAX.to_string()).unwrap();
        assert!(!control.is_running(&gw1).unwrap());

        fs::write(inst_dir.join(PID_FILE), "garbage").unwrap();
        assert!(!control.is_running(&gw1).unwrap());
    }

    #[test]
    fn start_needs_a_command() {
        let (dir, control) = setup();
        write_instance(dir.path(), "gateway", "gw1", "{}");
        let gw1 = control.instances("localhost").unwrap().remove(0);
        assert!(matches!(control.start(&gw1), Err(GpkgError::Config(_))));
    }
}
