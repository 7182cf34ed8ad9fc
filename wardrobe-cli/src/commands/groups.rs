//! `wardrobe groups [--json]`

use anyhow::Result;
use clap::Args;
use tabled::{settings::Style, Table};

use super::{Catalog, GroupJson, GroupRow};

#[derive(Args, Debug)]
pub struct GroupsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl GroupsArgs {
    pub fn run(self) -> Result<()> {
        let catalog = Catalog::open()?;
        let groups = catalog.registry().groups();

        if self.json {
            let rows: Vec<GroupJson> = groups.iter().map(|g| GroupJson::from_group(g)).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        let rows: Vec<GroupRow> = groups.iter().map(|g| GroupRow::from_group(g)).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
