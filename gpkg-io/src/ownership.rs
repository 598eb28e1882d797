// gpkg-io/src/ownership.rs
//! Re-owning freshly unpacked trees when gpkg runs as root.

use std::os::unix::fs::lchown;
use std::path::Path;

use gpkg_common::error::{GpkgError, Result};
use nix::unistd::{geteuid, User};
use tracing::debug;
use walkdir::WalkDir;

pub fn is_superuser() -> bool {
    geteuid().is_root()
}

/// Looks up the uid and primary gid of a local user.
pub fn lookup_user(name: &str) -> Result<(u32, u32)> {
    let user = User::from_name(name)?
        .ok_or_else(|| GpkgError::NotExist(format!("user {name:?}")))?;
    Ok((user.uid.as_raw(), user.gid.as_raw()))
}

/// Changes the owner of `root` and everything below it. Symlinks are changed
/// themselves, never followed.
pub fn chown_tree(root: &Path, uid: u32, gid: u32) -> Result<()> {
    debug!("Changing ownership of {} to {}:{}", root.display(), uid, gid);
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| GpkgError::from(std::io::Error::from(e)))?;
        lchown(entry.path(), Some(uid), Some(gid))?;
    }
    Ok(())
}
