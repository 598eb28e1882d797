// gpkg-io/src/host/local.rs
use std::io::Read;
use std::path::{Path, PathBuf};

use gpkg_common::error::Result;
use gpkg_common::host::{DirEntryInfo, FileStat, HostTarget, LOCALHOST};

use crate::fs;

/// The machine gpkg is running on.
#[derive(Debug, Clone)]
pub struct LocalHost {
    name: String,
    root: PathBuf,
}

impl LocalHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            name: LOCALHOST.to_string(),
            root: root.into(),
        }
    }
}

impl HostTarget for LocalHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        true
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        fs::list_directory_entries(path)
    }

    fn stat(&self, path: &Path) -> Result<Option<FileStat>> {
        fs::stat(path)
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        fs::create_dir_all(path, mode)
    }

    fn write_file(&self, path: &Path, mode: u32, contents: &mut dyn Read) -> Result<u64> {
        fs::write_file(path, mode, contents)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        fs::create_symlink(target, link)
    }

    fn read_link(&self, link: &Path) -> Result<Option<PathBuf>> {
        fs::read_link(link)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_directory_recursive(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::open_file(path)?))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn write_file_applies_mode_and_counts_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalHost::new(dir.path());
        let path = dir.path().join("start.sh");

        let written = host
            .write_file(&path, 0o700, &mut Cursor::new(b"#!/bin/sh\n".to_vec()))
            .unwrap();

        assert_eq!(written, 10);
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn rename_replaces_an_existing_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalHost::new(dir.path());
        let link = dir.path().join("active_prod");
        let tmp = dir.path().join(".active_prod.tmp");

        host.symlink(Path::new("5.10.0"), &link).unwrap();
        host.symlink(Path::new("5.11.2"), &tmp).unwrap();
        host.rename(&tmp, &link).unwrap();

        assert_eq!(host.read_link(&link).unwrap(), Some(PathBuf::from("5.11.2")));
        assert!(!host.exists(&tmp).unwrap());
    }

    #[test]
    fn remove_missing_file_is_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalHost::new(dir.path());
        let err = host.remove_file(&dir.path().join("missing")).unwrap_err();
        assert!(err.is_not_exist());
    }
}
