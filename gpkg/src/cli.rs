// gpkg/src/cli.rs
//! Defines the command-line argument structure using clap.
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use gpkg_common::component::ComponentDescriptor;
use gpkg_common::error::Result;
use gpkg_common::host::HostSelector;
use gpkg_common::options::{DownloadBackend, NexusRepository, Options, LATEST};
use gpkg_core::Context;

pub mod download;
pub mod install;
pub mod list;
pub mod update;

use crate::cli::download::DownloadArgs;
use crate::cli::install::InstallArgs;
use crate::cli::list::List;
use crate::cli::update::UpdateArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "gpkg", bin_name = "gpkg")]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a release on one or all hosts
    Install(InstallArgs),
    /// Move a base link to an installed version
    Update(UpdateArgs),
    /// Show installed versions and the base links using them
    #[command(alias = "ls")]
    List(List),
    /// Fetch a release archive without installing it
    Download(DownloadArgs),
}

impl Command {
    pub fn run(&self, ctx: &Context) -> Result<()> {
        match self {
            Self::Install(command) => command.run(ctx),
            Self::Update(command) => command.run(ctx),
            Self::List(command) => command.run(ctx),
            Self::Download(command) => command.run(ctx),
        }
    }
}

/// Where a command applies.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Component type, all types if omitted
    #[arg(value_name = "TYPE")]
    pub component: Option<String>,

    /// Host name from the fleet file, or "all"
    #[arg(short = 'H', long = "host", default_value = "all")]
    pub host: String,
}

impl TargetArgs {
    pub fn selector(&self) -> HostSelector {
        HostSelector::parse(&self.host)
    }

    pub fn component<'a>(&self, ctx: &'a Context) -> Result<Option<&'a ComponentDescriptor>> {
        self.component
            .as_deref()
            .map(|name| ctx.registry.require(name))
            .transpose()
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum Backend {
    #[default]
    Resources,
    Nexus,
}

/// Where and how release archives are fetched.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Version to fetch
    #[arg(short = 'V', long, default_value = LATEST)]
    pub version: String,

    #[arg(long, value_enum, default_value_t = Backend::Resources)]
    pub backend: Backend,

    /// Use the snapshots repository (nexus only)
    #[arg(long)]
    pub snapshots: bool,

    /// Download username, the password comes from GPKG_DOWNLOAD_PASSWORD
    #[arg(short, long)]
    pub username: Option<String>,

    /// Platform as ID:PLATFORM, e.g. rhel:el8
    #[arg(long = "platform", value_name = "ID:PLATFORM")]
    pub platform_id: Option<String>,
}

impl SourceArgs {
    pub fn apply(&self, opts: Options) -> Options {
        Options {
            version: self.version.clone(),
            backend: match self.backend {
                Backend::Resources => DownloadBackend::Resources,
                Backend::Nexus => DownloadBackend::Nexus,
            },
            repository: if self.snapshots {
                NexusRepository::Snapshots
            } else {
                NexusRepository::Releases
            },
            username: self.username.clone().or(opts.username),
            platform_id: self.platform_id.clone(),
            ..opts
        }
    }
}
