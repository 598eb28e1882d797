// gpkg/src/cli/list.rs
use clap::Args;
use colored::Colorize;
use gpkg_common::error::Result;
use gpkg_core::{list_installed, Context};
use prettytable::{format, Cell, Row, Table};

use crate::cli::TargetArgs;

#[derive(Args, Debug)]
pub struct List {
    #[command(flatten)]
    target: TargetArgs,

    /// Print JSON instead of a table
    #[arg(short, long)]
    json: bool,
}

impl List {
    pub fn run(&self, ctx: &Context) -> Result<()> {
        let component = self.target.component(ctx)?;
        let packages = list_installed(ctx, &self.target.selector(), component)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&packages)?);
            return Ok(());
        }
        if packages.is_empty() {
            println!("{}", "0 packages installed".yellow());
            return Ok(());
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.add_row(Row::new(vec![
            Cell::new("Host").style_spec("b"),
            Cell::new("Type").style_spec("b"),
            Cell::new("Version").style_spec("b"),
            Cell::new("Links").style_spec("b"),
            Cell::new("Path").style_spec("b"),
        ]));
        for pkg in &packages {
            table.add_row(Row::new(vec![
                Cell::new(&pkg.host),
                Cell::new(&pkg.component).style_spec("Fg"),
                Cell::new(&pkg.version).style_spec("Fb"),
                Cell::new(&pkg.links.join(", ")),
                Cell::new(&pkg.path.display().to_string()),
            ]));
        }
        table.printstd();
        println!("{}", format!("{} packages installed", packages.len()).bold());
        Ok(())
    }
}
