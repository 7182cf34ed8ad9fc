//! `wardrobe world assign|unassign`

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use super::Catalog;

#[derive(Subcommand, Debug)]
pub enum WorldCommand {
    /// Move a world into a group's explicit set, removing it from all others.
    Assign { world: String, group: String },

    /// Remove a world from every group's explicit set.
    Unassign { world: String },
}

pub fn run(cmd: WorldCommand) -> Result<()> {
    let catalog = Catalog::open()?;
    match cmd {
        WorldCommand::Assign { world, group } => {
            catalog
                .registry()
                .assign_world_to_group(&world, &group)
                .with_context(|| format!("failed to assign '{world}' to '{group}'"))?;
            catalog.save()?;
            println!("{} '{}' now belongs to '{}'", "✓".green(), world, group);
        }
        WorldCommand::Unassign { world } => {
            catalog.registry().unassign_world(&world);
            catalog.save()?;
            let now = catalog.registry().resolve_group_for_world(&world);
            println!(
                "{} '{}' unassigned; it now resolves to '{}'",
                "✓".green(),
                world,
                now.name
            );
        }
    }
    Ok(())
}
