// gpkg-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::Result;

// Fallback if GENEOS_HOME is not set or is empty.
const DEFAULT_GENEOS_ROOT: &str = "/opt/itrs";
const DEFAULT_DOWNLOAD_URL: &str = "https://resources.itrsgroup.com/download/latest/";
const DEFAULT_NEXUS_URL: &str =
    "https://nexus.itrsgroup.com/service/rest/v1/search/assets/download";
const HOSTS_FILENAME: &str = "hosts.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub geneos_root: PathBuf,
    pub download_url: String,
    pub nexus_url: String,
    pub download_username: Option<String>,
    pub download_password: Option<String>,
    pub default_user: Option<String>,
    pub hosts_file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading gpkg configuration");

        let geneos_root = env_nonempty("GENEOS_HOME").unwrap_or_else(|| {
            debug!(
                "GENEOS_HOME not set or empty, falling back to default: {}",
                DEFAULT_GENEOS_ROOT
            );
            DEFAULT_GENEOS_ROOT.to_string()
        });
        debug!("Effective geneos root set to: {}", geneos_root);

        let hosts_file = env_nonempty("GPKG_HOSTS_FILE")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("gpkg").join(HOSTS_FILENAME)));

        let config = Self {
            geneos_root: PathBuf::from(geneos_root),
            download_url: env_nonempty("GPKG_DOWNLOAD_URL")
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_URL.to_string()),
            nexus_url: env_nonempty("GPKG_NEXUS_URL")
                .unwrap_or_else(|| DEFAULT_NEXUS_URL.to_string()),
            download_username: env_nonempty("GPKG_DOWNLOAD_USERNAME"),
            download_password: env_nonempty("GPKG_DOWNLOAD_PASSWORD"),
            default_user: env_nonempty("GPKG_DEFAULT_USER"),
            hosts_file,
        };
        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    /// Configuration rooted at `root` with default endpoints, no credentials
    /// and no fleet file.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            geneos_root: root.into(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            nexus_url: DEFAULT_NEXUS_URL.to_string(),
            download_username: None,
            download_password: None,
            default_user: None,
            hosts_file: None,
        }
    }

    pub fn geneos_root(&self) -> &Path {
        &self.geneos_root
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.geneos_root.join("packages")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.packages_dir().join("downloads")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.geneos_root.join("logs")
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_follow_the_packages_layout() {
        let config = Config::with_root("/srv/geneos");
        assert_eq!(config.packages_dir(), PathBuf::from("/srv/geneos/packages"));
        assert_eq!(
            config.downloads_dir(),
            PathBuf::from("/srv/geneos/packages/downloads")
        );
        assert_eq!(config.logs_dir(), PathBuf::from("/srv/geneos/logs"));
    }
}
