/*
File: gpkg-io/src/fs.rs
Purpose: Primitive synchronous filesystem operations.
*/
use std::{
    fs::{self, DirBuilder, File, OpenOptions},
    io::{self, Read},
    os::unix::fs::{symlink, DirBuilderExt, OpenOptionsExt},
    path::{Path, PathBuf},
};

use gpkg_common::error::{GpkgError, Result};
use gpkg_common::host::{DirEntryInfo, FileStat};
use tracing::{debug, error, warn};

/// Returns metadata for a path, following symlinks. `None` if it does not exist.
pub fn stat(path: &Path) -> Result<Option<FileStat>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(FileStat {
            is_dir: meta.is_dir(),
            len: meta.len(),
        })),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GpkgError::from(e)),
    }
}

/// Creates a directory and all its missing parents with `mode`.
pub fn create_dir_all(path: &Path, mode: u32) -> Result<()> {
    debug!("Creating directory recursively: {} ({:o})", path.display(), mode);
    DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)
        .map_err(|e| {
            error!("Failed create dir {}: {}", path.display(), e);
            GpkgError::from(e)
        })
}

/// Removes a file or symlink.
pub fn remove_file(path: &Path) -> Result<()> {
    debug!("Removing file: {}", path.display());
    fs::remove_file(path).map_err(|e| {
        if e.kind() != io::ErrorKind::NotFound {
            error!("Failed remove file {}: {}", path.display(), e);
        }
        GpkgError::from(e)
    })
}

/// Removes a directory and all its contents recursively.
pub fn remove_directory_recursive(path: &Path) -> Result<()> {
    debug!("Removing directory recursively: {}", path.display());
    fs::remove_dir_all(path).map_err(|e| {
        if e.kind() != io::ErrorKind::NotFound {
            error!("Failed remove dir_all {}: {}", path.display(), e);
        }
        GpkgError::from(e)
    })
}

/// Creates (truncating) a file with `mode` and copies `contents` into it.
pub fn write_file(path: &Path, mode: u32, contents: &mut dyn Read) -> Result<u64> {
    let mut out = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|e| {
            error!("Failed create file {}: {}", path.display(), e);
            GpkgError::from(e)
        })?;
    let written = io::copy(contents, &mut out)?;
    debug!("Wrote {} bytes to {}", written, path.display());
    Ok(written)
}

/// Opens an existing file for reading.
pub fn open_file(path: &Path) -> Result<File> {
    debug!("Opening file: {}", path.display());
    File::open(path).map_err(|e| {
        if e.kind() != io::ErrorKind::NotFound {
            error!("Failed open file {}: {}", path.display(), e);
        }
        GpkgError::from(e)
    })
}

/// Creates a symbolic link at `link` pointing to `target`.
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    debug!("Creating symlink {} -> {}", link.display(), target.display());
    symlink(target, link).map_err(|e| {
        error!(
            "Failed create symlink {} -> {}: {}",
            link.display(),
            target.display(),
            e
        );
        GpkgError::from(e)
    })
}

/// Reads a symlink. Anything other than a symlink at `link` is `None`.
pub fn read_link(link: &Path) -> Result<Option<PathBuf>> {
    match fs::read_link(link) {
        Ok(target) => Ok(Some(target)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
            warn!("{} exists but is not a symlink", link.display());
            Ok(None)
        }
        Err(e) => Err(GpkgError::from(e)),
    }
}

/// Renames `from` to `to`, atomically replacing a non-directory at `to`.
pub fn rename(from: &Path, to: &Path) -> Result<()> {
    debug!("Renaming {} -> {}", from.display(), to.display());
    fs::rename(from, to).map_err(|e| {
        error!(
            "Failed rename {} -> {}: {}",
            from.display(),
            to.display(),
            e
        );
        GpkgError::from(e)
    })
}

/// Lists directory entries without following symlinks.
/// Skips entries that cause errors during reading.
pub fn list_directory_entries(dir_path: &Path) -> Result<Vec<DirEntryInfo>> {
    debug!("Listing directory entries for: {}", dir_path.display());
    let mut entries = Vec::new();

    let read_dir = fs::read_dir(dir_path).map_err(|e| {
        if e.kind() != io::ErrorKind::NotFound {
            error!("Failed to read directory {}: {}", dir_path.display(), e);
        }
        GpkgError::from(e)
    })?;
    for entry_res in read_dir {
        let entry = match entry_res {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error reading entry in {}: {}", dir_path.display(), e);
                continue;
            }
        };
        match entry.file_type() {
            Ok(file_type) => entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: file_type.is_dir(),
                is_symlink: file_type.is_symlink(),
            }),
            Err(e) => warn!(
                "Failed to get file type for {} in {}: {}",
                entry.path().display(),
                dir_path.display(),
                e
            ),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_link_distinguishes_missing_and_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let link = dir.path().join("link");
        create_symlink(Path::new("plain"), &link).unwrap();

        assert_eq!(read_link(&link).unwrap(), Some(PathBuf::from("plain")));
        assert_eq!(read_link(&file).unwrap(), None);
        assert_eq!(read_link(&dir.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn listing_reports_symlinks_separately() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("5.10.0")).unwrap();
        create_symlink(Path::new("5.10.0"), &dir.path().join("active_prod")).unwrap();

        let mut entries = list_directory_entries(dir.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "5.10.0");
        assert!(entries[0].is_dir);
        assert!(entries[1].is_symlink);
        assert!(!entries[1].is_dir);
    }

    #[test]
    fn stat_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(stat(&dir.path().join("nope")).unwrap(), None);
        let stat = stat(dir.path()).unwrap().unwrap();
        assert!(stat.is_dir);
    }
}
