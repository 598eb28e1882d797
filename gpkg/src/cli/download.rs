// gpkg/src/cli/download.rs
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use gpkg_common::error::Result;
use gpkg_common::options::Options;
use gpkg_core::{download_only, Context};
use tracing::instrument;

use crate::cli::SourceArgs;

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Component type to fetch
    #[arg(value_name = "TYPE")]
    component: String,

    #[command(flatten)]
    source: SourceArgs,

    /// Directory to save into, the downloads directory by default
    #[arg(short, long, value_name = "DIR")]
    dir: Option<PathBuf>,
}

impl DownloadArgs {
    #[instrument(skip(self, ctx), fields(component = %self.component))]
    pub fn run(&self, ctx: &Context) -> Result<()> {
        let component = ctx.registry.require(&self.component)?;
        let opts = self.source.apply(Options::default());
        let dest = self
            .dir
            .clone()
            .unwrap_or_else(|| ctx.config.downloads_dir());

        let saved = download_only(&ctx.config, component, &opts, &dest)?;
        println!("{} {}", "Downloaded".green().bold(), saved.display());
        Ok(())
    }
}
