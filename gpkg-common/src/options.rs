// gpkg-common/src/options.rs
//! The option record shared by install, update and download operations.
//!
//! Built once by the caller and passed down by reference. Anything that needs
//! a variation (the unarchiver pinning the version it just installed, for
//! example) derives a new record with one of the `with_*` methods.

use std::fmt;

pub const LATEST: &str = "latest";
pub const DEFAULT_BASENAME: &str = "active_prod";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadBackend {
    /// The vendor resources endpoint configured by `download_url`.
    #[default]
    Resources,
    /// The Nexus artifact search API configured by `nexus_url`.
    Nexus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NexusRepository {
    #[default]
    Releases,
    Snapshots,
}

impl NexusRepository {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Releases => "releases",
            Self::Snapshots => "snapshots",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Options {
    pub version: String,
    pub basename: String,
    pub force: bool,
    pub restart: bool,
    pub local_only: bool,
    pub no_save: bool,
    /// `TYPE:VERSION` for archives with non-standard names.
    pub override_spec: Option<String>,
    /// File path, URL, directory or `-` for stdin.
    pub source: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `ID:PLATFORM` as found in os-release, e.g. `rhel:el8`.
    pub platform_id: Option<String>,
    pub backend: DownloadBackend,
    pub repository: NexusRepository,
    /// Install only: swap the base link (forcefully) after unpacking.
    pub update: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            version: LATEST.to_string(),
            basename: DEFAULT_BASENAME.to_string(),
            force: false,
            restart: false,
            local_only: false,
            no_save: false,
            override_spec: None,
            source: None,
            username: None,
            password: None,
            platform_id: None,
            backend: DownloadBackend::default(),
            repository: NexusRepository::default(),
            update: false,
        }
    }
}

impl Options {
    pub fn is_latest(&self) -> bool {
        self.version.is_empty() || self.version == LATEST
    }

    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    pub fn with_force(&self, force: bool) -> Self {
        Self {
            force,
            ..self.clone()
        }
    }

    pub fn with_source(&self, source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..self.clone()
        }
    }

    /// The platform suffix from `platform_id`, e.g. `el8` from `rhel:el8`.
    pub fn platform(&self) -> Option<&str> {
        self.platform_id
            .as_deref()
            .and_then(|id| id.split(':').nth(1))
            .filter(|p| !p.is_empty())
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("version", &self.version)
            .field("basename", &self.basename)
            .field("force", &self.force)
            .field("restart", &self.restart)
            .field("local_only", &self.local_only)
            .field("no_save", &self.no_save)
            .field("override_spec", &self.override_spec)
            .field("source", &self.source)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("platform_id", &self.platform_id)
            .field("backend", &self.backend)
            .field("repository", &self.repository)
            .field("update", &self.update)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_cli_defaults() {
        let opts = Options::default();
        assert!(opts.is_latest());
        assert_eq!(opts.basename, "active_prod");
        assert_eq!(opts.repository.as_str(), "releases");
    }

    #[test]
    fn platform_is_taken_from_the_second_field() {
        let opts = Options {
            platform_id: Some("rhel:el8".into()),
            ..Options::default()
        };
        assert_eq!(opts.platform(), Some("el8"));
        let opts = Options {
            platform_id: Some("ubuntu".into()),
            ..Options::default()
        };
        assert_eq!(opts.platform(), None);
    }

    #[test]
    fn with_version_leaves_the_original_untouched() {
        let opts = Options::default();
        let pinned = opts.with_version("5.11.2");
        assert!(opts.is_latest());
        assert_eq!(pinned.version, "5.11.2");
    }

    #[test]
    fn debug_output_hides_the_password() {
        let opts = Options {
            password: Some("hunter2".into()),
            ..Options::default()
        };
        assert!(!format!("{opts:?}").contains("hunter2"));
    }
}
