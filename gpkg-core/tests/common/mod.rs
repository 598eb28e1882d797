// gpkg-core/tests/common/mod.rs
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::host::{DirEntryInfo, FileStat, HostTarget};
use gpkg_common::instance::{Instance, InstanceControl, SignalOutcome, StopSignal};
use gpkg_common::{ComponentRegistry, Config, Fleet};
use gpkg_core::Context;
use gpkg_io::LocalHost;
use tar::{Builder, EntryType, Header};

/// A local fleet rooted in a fresh temporary directory.
pub fn local_context() -> (tempfile::TempDir, Context) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with(dir.path(), Arc::new(LocalHost::new(dir.path())));
    (dir, ctx)
}

pub fn context_with(root: &Path, host: Arc<dyn HostTarget>) -> Context {
    Context::new(
        Config::with_root(root),
        ComponentRegistry::standard(),
        Fleet::new(vec![host]),
    )
}

pub fn install_versions(root: &Path, component: &str, versions: &[&str]) {
    for v in versions {
        fs::create_dir_all(root.join("packages").join(component).join(v)).unwrap();
    }
}

pub fn point_link(root: &Path, component: &str, basename: &str, version: &str) {
    let link = root.join("packages").join(component).join(basename);
    let _ = fs::remove_file(&link);
    std::os::unix::fs::symlink(version, link).unwrap();
}

pub fn link_target(root: &Path, component: &str, basename: &str) -> Option<String> {
    fs::read_link(root.join("packages").join(component).join(basename))
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

/// Builds gzipped tarballs entry by entry. Names and link targets are
/// written into the header verbatim, so hostile archives can be made too.
pub struct ArchiveBuilder {
    builder: Builder<Vec<u8>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            builder: Builder::new(Vec::new()),
        }
    }

    pub fn dir(mut self, name: &str, mode: u32) -> Self {
        let header = raw_header(name, EntryType::Directory, 0, mode, None);
        self.builder.append(&header, std::io::empty()).unwrap();
        self
    }

    pub fn file(mut self, name: &str, contents: &[u8], mode: u32) -> Self {
        let header = raw_header(name, EntryType::Regular, contents.len() as u64, mode, None);
        self.builder.append(&header, contents).unwrap();
        self
    }

    pub fn symlink(mut self, name: &str, target: &str) -> Self {
        let header = raw_header(name, EntryType::Symlink, 0, 0o777, Some(target));
        self.builder.append(&header, std::io::empty()).unwrap();
        self
    }

    pub fn gzipped(self) -> Vec<u8> {
        let tar = self.builder.into_inner().unwrap();
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&tar).unwrap();
        gz.finish().unwrap()
    }
}

fn raw_header(name: &str, kind: EntryType, size: u64, mode: u32, link: Option<&str>) -> Header {
    let mut header = Header::new_gnu();
    {
        let old = header.as_old_mut();
        old.name[..name.len()].copy_from_slice(name.as_bytes());
        if let Some(link) = link {
            old.linkname[..link.len()].copy_from_slice(link.as_bytes());
        }
    }
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_cksum();
    header
}

/// A small but valid gateway release.
pub fn gateway_release() -> Vec<u8> {
    ArchiveBuilder::new()
        .dir("gateway/", 0o755)
        .dir("gateway/bin/", 0o755)
        .file("gateway/bin/gateway2.linux_64", b"#!/bin/sh\nexit 0\n", 0o755)
        .symlink("gateway/bin/gateway2", "gateway2.linux_64")
        .file("gateway/README", b"gateway\n", 0o644)
        .gzipped()
}

#[derive(Debug, Clone)]
struct FakeProcess {
    instance: Instance,
    running: bool,
    /// `None` never stops, not even for KILL.
    stops_on_term: Option<bool>,
    start_fails: bool,
}

/// An in-memory instance manager that logs every signal and start, noting
/// where the instance's base link pointed when it was started.
pub struct FakeControl {
    root: PathBuf,
    processes: RefCell<HashMap<String, FakeProcess>>,
    pub events: RefCell<Vec<String>>,
}

impl FakeControl {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            processes: RefCell::new(HashMap::new()),
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn add(&self, name: &str, component: &str, basename: &str, running: bool) -> &Self {
        self.add_instance(instance(name, component, basename, false), running)
    }

    pub fn add_protected(&self, name: &str, component: &str, basename: &str) -> &Self {
        self.add_instance(instance(name, component, basename, true), true)
    }

    pub fn add_instance(&self, instance: Instance, running: bool) -> &Self {
        self.processes.borrow_mut().insert(
            instance.name.clone(),
            FakeProcess {
                instance,
                running,
                stops_on_term: Some(true),
                start_fails: false,
            },
        );
        self
    }

    /// Ignores TERM and KILL alike.
    pub fn make_unkillable(&self, name: &str) {
        if let Some(p) = self.processes.borrow_mut().get_mut(name) {
            p.stops_on_term = None;
        }
    }

    pub fn make_start_fail(&self, name: &str) {
        if let Some(p) = self.processes.borrow_mut().get_mut(name) {
            p.start_fails = true;
        }
    }

    pub fn is_up(&self, name: &str) -> bool {
        self.processes.borrow().get(name).is_some_and(|p| p.running)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    fn record(&self, event: String) {
        self.events.borrow_mut().push(event);
    }
}

impl InstanceControl for FakeControl {
    fn instances(&self, host: &str) -> Result<Vec<Instance>> {
        let mut found: Vec<Instance> = self
            .processes
            .borrow()
            .values()
            .filter(|p| p.instance.host == host)
            .map(|p| p.instance.clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    fn is_running(&self, instance: &Instance) -> Result<bool> {
        Ok(self.is_up(&instance.name))
    }

    fn signal(&self, instance: &Instance, signal: StopSignal) -> Result<SignalOutcome> {
        let mut processes = self.processes.borrow_mut();
        let Some(p) = processes.get_mut(&instance.name) else {
            return Ok(SignalOutcome::ProcessGone);
        };
        if !p.running {
            return Ok(SignalOutcome::ProcessGone);
        }
        let name = match signal {
            StopSignal::Terminate => "term",
            StopSignal::Kill => "kill",
        };
        if p.stops_on_term.is_some() {
            p.running = false;
        }
        drop(processes);
        self.record(format!("{name} {}", instance.name));
        Ok(SignalOutcome::Delivered)
    }

    fn start(&self, instance: &Instance) -> Result<()> {
        let mut processes = self.processes.borrow_mut();
        let Some(p) = processes.get_mut(&instance.name) else {
            return Err(GpkgError::NotExist(instance.name.clone()));
        };
        if p.start_fails {
            return Err(GpkgError::Generic(format!("{} refused to start", instance.name)));
        }
        p.running = true;
        drop(processes);
        let at = link_target(&self.root, &instance.component, &instance.basename)
            .unwrap_or_else(|| "nothing".into());
        self.record(format!("start {} at {at}", instance.name));
        Ok(())
    }
}

pub fn instance(name: &str, component: &str, basename: &str, protected: bool) -> Instance {
    Instance {
        name: name.into(),
        component: component.into(),
        host: "localhost".into(),
        basename: basename.into(),
        pkgtype: None,
        protected,
    }
}

/// Wraps a host and counts every call that changes the filesystem.
pub struct RecordingHost {
    inner: LocalHost,
    mutations: AtomicUsize,
}

impl RecordingHost {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalHost::new(root),
            mutations: AtomicUsize::new(0),
        }
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

impl HostTarget for RecordingHost {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_local(&self) -> bool {
        true
    }

    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        self.inner.read_dir(path)
    }

    fn stat(&self, path: &Path) -> Result<Option<FileStat>> {
        self.inner.stat(path)
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        self.mutated();
        self.inner.create_dir_all(path, mode)
    }

    fn write_file(&self, path: &Path, mode: u32, contents: &mut dyn Read) -> Result<u64> {
        self.mutated();
        self.inner.write_file(path, mode, contents)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        self.mutated();
        self.inner.symlink(target, link)
    }

    fn read_link(&self, link: &Path) -> Result<Option<PathBuf>> {
        self.inner.read_link(link)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.mutated();
        self.inner.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.mutated();
        self.inner.remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.mutated();
        self.inner.rename(from, to)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        self.inner.open(path)
    }
}
