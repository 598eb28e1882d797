// gpkg-core/src/archive.rs
//! Finding and opening release archives: an explicit source, the local
//! downloads directory, or one of the network backends.

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use gpkg_common::component::ComponentDescriptor;
use gpkg_common::config::Config;
use gpkg_common::error::{GpkgError, Result};
use gpkg_common::options::Options;
use gpkg_io::{fs, ownership};
use gpkg_net::validation::is_url;
use gpkg_net::{build_http_client, check_archive, download_to, fetch_url, verify_gzip, RemoteArchive};
use tracing::{debug, warn};

use crate::unarchive::parse_archive_name;
use crate::version::resolve_by;

const STDIN_SOURCE: &str = "-";
const DOWNLOADS_MODE: u32 = 0o775;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOrigin {
    /// A file on the local filesystem, cached or given explicitly.
    Local(PathBuf),
    Stdin,
    /// Streamed straight from this URL without being saved.
    Remote(String),
}

impl fmt::Display for ArchiveOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Stdin => f.write_str("stdin"),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// An open archive ready to be unpacked.
pub struct ArchiveDescriptor {
    pub filename: String,
    pub origin: ArchiveOrigin,
    pub reader: Box<dyn Read + Send>,
}

impl fmt::Debug for ArchiveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveDescriptor")
            .field("filename", &self.filename)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Opens the archive for `component` that `opts` asks for.
///
/// An explicit source wins. A source directory, or `local_only`, restricts
/// the search to archive files in that directory (the downloads directory by
/// default). Otherwise the configured backend is asked, and a cached copy of
/// the same name and length is used in preference to downloading.
pub fn open_archive(
    config: &Config,
    component: &ComponentDescriptor,
    opts: &Options,
) -> Result<ArchiveDescriptor> {
    let mut local_dir = None;
    if let Some(source) = opts.source.as_deref() {
        match open_source(config, source, opts)? {
            Some(archive) => return Ok(archive),
            None => {
                debug!("Source {} is a directory, searching it", source);
                local_dir = Some(PathBuf::from(source));
            }
        }
    }

    if opts.local_only || local_dir.is_some() {
        let dir = local_dir.unwrap_or_else(|| config.downloads_dir());
        return open_local(&dir, component, opts);
    }

    let client = build_http_client()?;
    let remote = check_archive(&client, config, component, opts)?;
    fetch_remote(config, remote, opts)
}

/// Downloads the archive for `component` into `dest` without unpacking it,
/// returning the saved path.
pub fn download_only(
    config: &Config,
    component: &ComponentDescriptor,
    opts: &Options,
    dest: &Path,
) -> Result<PathBuf> {
    let client = build_http_client()?;
    let remote = check_archive(&client, config, component, opts)?;
    fs::create_dir_all(dest, DOWNLOADS_MODE)?;
    save(config, remote, dest)
}

/// `None` when `source` is a directory.
fn open_source(config: &Config, source: &str, opts: &Options) -> Result<Option<ArchiveDescriptor>> {
    if source == STDIN_SOURCE {
        return Ok(Some(ArchiveDescriptor {
            filename: STDIN_SOURCE.to_string(),
            origin: ArchiveOrigin::Stdin,
            reader: Box::new(io::stdin()),
        }));
    }

    if is_url(source) {
        let client = build_http_client()?;
        let remote = fetch_url(&client, source)?;
        return fetch_remote(config, remote, opts).map(Some);
    }

    let path = Path::new(source);
    match fs::stat(path)? {
        Some(stat) if stat.is_dir => Ok(None),
        Some(_) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| GpkgError::InvalidArgs(format!("{source:?} has no filename")))?;
            Ok(Some(ArchiveDescriptor {
                filename,
                origin: ArchiveOrigin::Local(path.to_path_buf()),
                reader: Box::new(fs::open_file(path)?),
            }))
        }
        None => Err(GpkgError::NotExist(format!("archive source {source:?}"))),
    }
}

/// Picks the latest (or requested) archive for `component` in `dir`.
fn open_local(dir: &Path, component: &ComponentDescriptor, opts: &Options) -> Result<ArchiveDescriptor> {
    let no_match = || {
        GpkgError::NotExist(format!(
            "no {:?} archive for {} in {}",
            opts.version,
            component,
            dir.display()
        ))
    };

    let entries = match fs::list_directory_entries(dir) {
        Ok(entries) => entries,
        Err(e) if e.is_not_exist() => return Err(no_match()),
        Err(e) => return Err(e),
    };
    let candidates: Vec<(String, String)> = entries
        .into_iter()
        .filter(|e| !e.is_dir && component.matches_archive(&e.name))
        .filter_map(|e| {
            let (fragment, version) = parse_archive_name(&e.name)?;
            (fragment == component.archive_name).then(|| (version.to_string(), e.name.clone()))
        })
        .collect();
    debug!("Local archive candidates for {}: {:?}", component, candidates);

    let (_, filename) = resolve_by(&candidates, |(v, _)| v.as_str(), &opts.version).ok_or_else(no_match)?;
    let path = dir.join(filename);
    Ok(ArchiveDescriptor {
        filename: filename.clone(),
        reader: Box::new(fs::open_file(&path)?),
        origin: ArchiveOrigin::Local(path),
    })
}

fn fetch_remote(config: &Config, remote: RemoteArchive, opts: &Options) -> Result<ArchiveDescriptor> {
    let downloads = config.downloads_dir();
    fs::create_dir_all(&downloads, DOWNLOADS_MODE)?;
    let cached = downloads.join(&remote.filename);

    if let (Some(stat), Some(len)) = (fs::stat(&cached)?, remote.content_length) {
        if !stat.is_dir && stat.len == len {
            debug!("Not downloading, file already exists: {}", cached.display());
            return Ok(ArchiveDescriptor {
                filename: remote.filename,
                reader: Box::new(fs::open_file(&cached)?),
                origin: ArchiveOrigin::Local(cached),
            });
        }
    }

    if opts.no_save {
        let url = remote.url.to_string();
        return Ok(ArchiveDescriptor {
            filename: remote.filename.clone(),
            origin: ArchiveOrigin::Remote(url),
            reader: remote.into_reader(),
        });
    }

    let filename = remote.filename.clone();
    let path = save(config, remote, &downloads)?;
    Ok(ArchiveDescriptor {
        filename,
        reader: Box::new(fs::open_file(&path)?),
        origin: ArchiveOrigin::Local(path),
    })
}

/// Streams `remote` to `<dir>/<filename>` by way of a temporary file.
fn save(config: &Config, remote: RemoteArchive, dir: &Path) -> Result<PathBuf> {
    let final_path = dir.join(&remote.filename);
    let temp_path = dir.join(format!(".{}.download", remote.filename));
    println!("downloading {} to {}", remote.url, final_path.display());

    let result = download_to(remote, &temp_path)
        .and_then(|_| verify_gzip(&temp_path))
        .and_then(|()| fs::rename(&temp_path, &final_path));
    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&temp_path) {
            if !cleanup.is_not_exist() {
                warn!("Could not remove {}: {}", temp_path.display(), cleanup);
            }
        }
        return Err(e);
    }

    if ownership::is_superuser() {
        if let Some(user) = config.default_user.as_deref() {
            let owned = ownership::lookup_user(user)
                .and_then(|(uid, gid)| ownership::chown_tree(&final_path, uid, gid));
            if let Err(e) = owned {
                warn!("Cannot change ownership of {}: {}", final_path.display(), e);
            }
        }
    }
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use gpkg_common::ComponentRegistry;

    use super::*;

    fn gz_bytes(payload: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload).unwrap();
        enc.finish().unwrap()
    }

    fn downloads_with(names: &[&str]) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        std::fs::create_dir_all(config.downloads_dir()).unwrap();
        for name in names {
            std::fs::write(config.downloads_dir().join(name), gz_bytes(name.as_bytes())).unwrap();
        }
        (dir, config)
    }

    #[test]
    fn local_only_picks_the_latest_matching_archive() {
        let (_dir, config) = downloads_with(&[
            "geneos-netprobe-5.9.0-linux-x64.tar.gz",
            "geneos-netprobe-5.14.1-linux-x64.tar.gz",
            "geneos-fixanalyser2-netprobe-6.2.0-linux-x64.tar.gz",
            "geneos-gateway-7.0.0-linux-x64.tar.gz",
            "README.txt",
        ]);
        let registry = ComponentRegistry::standard();
        let netprobe = registry.require("netprobe").unwrap();
        let opts = Options {
            local_only: true,
            ..Options::default()
        };

        let archive = open_archive(&config, netprobe, &opts).unwrap();
        assert_eq!(archive.filename, "geneos-netprobe-5.14.1-linux-x64.tar.gz");
        assert!(matches!(archive.origin, ArchiveOrigin::Local(_)));

        let pinned = open_archive(&config, netprobe, &opts.with_version("5.9.0")).unwrap();
        assert_eq!(pinned.filename, "geneos-netprobe-5.9.0-linux-x64.tar.gz");
    }

    #[test]
    fn local_only_without_a_match_is_not_exist() {
        let (_dir, config) = downloads_with(&["geneos-gateway-7.0.0-linux-x64.tar.gz"]);
        let registry = ComponentRegistry::standard();
        let licd = registry.require("licd").unwrap();
        let opts = Options {
            local_only: true,
            ..Options::default()
        };
        assert!(open_archive(&config, licd, &opts).unwrap_err().is_not_exist());
    }

    #[test]
    fn explicit_file_and_directory_sources() {
        let (_dir, config) = downloads_with(&["geneos-licd-5.11.2-linux-x64.tar.gz"]);
        let registry = ComponentRegistry::standard();
        let licd = registry.require("licd").unwrap();

        let file = config.downloads_dir().join("geneos-licd-5.11.2-linux-x64.tar.gz");
        let opts = Options::default().with_source(file.to_string_lossy());
        let archive = open_archive(&config, licd, &opts).unwrap();
        assert_eq!(archive.origin, ArchiveOrigin::Local(file.clone()));

        let opts = Options::default().with_source(config.downloads_dir().to_string_lossy());
        let archive = open_archive(&config, licd, &opts).unwrap();
        assert_eq!(archive.filename, "geneos-licd-5.11.2-linux-x64.tar.gz");

        let opts = Options::default().with_source("/nonexistent/geneos-licd.tar.gz");
        assert!(open_archive(&config, licd, &opts).unwrap_err().is_not_exist());
    }

    #[test]
    fn cached_copy_of_the_same_length_is_reused() {
        use httpmock::prelude::*;

        let body = gz_bytes(b"fresh");
        let name = "geneos-gateway-5.11.2-linux-x64.tar.gz";
        let (_dir, mut config) = downloads_with(&[]);
        std::fs::write(config.downloads_dir().join(name), vec![0u8; body.len()]).unwrap();

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/download/latest/geneos-gateway");
            then.status(200)
                .header("content-disposition", format!("attachment; filename={name}"))
                .body(body.clone());
        });
        config.download_url = server.url("/download/latest/");

        let registry = ComponentRegistry::standard();
        let gateway = registry.require("gateway").unwrap();
        let mut archive = open_archive(&config, gateway, &Options::default()).unwrap();
        let mut contents = Vec::new();
        archive.reader.read_to_end(&mut contents).unwrap();
        // the zero-filled cached file, not the network body
        assert_eq!(contents, vec![0u8; body.len()]);
    }

    #[test]
    fn downloads_are_saved_and_reopened() {
        use httpmock::prelude::*;

        let body = gz_bytes(b"payload");
        let name = "geneos-gateway-5.11.2-linux-x64.tar.gz";
        let (_dir, mut config) = downloads_with(&[]);
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/download/latest/geneos-gateway");
            then.status(200)
                .header("content-disposition", format!("attachment; filename={name}"))
                .body(body.clone());
        });
        config.download_url = server.url("/download/latest/");

        let registry = ComponentRegistry::standard();
        let gateway = registry.require("gateway").unwrap();
        let mut archive = open_archive(&config, gateway, &Options::default()).unwrap();
        let mut contents = Vec::new();
        archive.reader.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, body);
        assert_eq!(archive.origin, ArchiveOrigin::Local(config.downloads_dir().join(name)));
        assert!(!config.downloads_dir().join(format!(".{name}.download")).exists());
    }
}
