// gpkg-core/src/lib.rs
//! Release management for Geneos components: choosing versions, fetching and
//! unpacking archives, switching base links and rolling instances over.

pub mod activation;
pub mod archive;
pub mod install;
pub mod inventory;
pub mod rollout;
pub mod unarchive;
pub mod version;

use gpkg_common::{ComponentRegistry, Config, Fleet};

pub use activation::{activate, activate_host, ActivationOutcome, ActivationStatus};
pub use archive::{download_only, open_archive, ArchiveDescriptor, ArchiveOrigin};
pub use install::{install, InstallOutcome, InstallStatus};
pub use inventory::{list_installed, InstalledPackage};
pub use rollout::{RolloutCoordinator, RolloutReport, StopPolicy};
pub use unarchive::{unarchive, InstalledVersion, Unpacked};
pub use version::{parse_version, resolve};

/// Everything an operation needs besides its arguments. Built once by the
/// caller and passed down by reference.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub registry: ComponentRegistry,
    pub fleet: Fleet,
}

impl Context {
    pub fn new(config: Config, registry: ComponentRegistry, fleet: Fleet) -> Self {
        Self {
            config,
            registry,
            fleet,
        }
    }
}
