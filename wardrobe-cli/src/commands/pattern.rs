//! `wardrobe pattern add|remove <group> <regex>`

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use super::Catalog;

#[derive(Subcommand, Debug)]
pub enum PatternCommand {
    /// Append a pattern. It must match the whole world name.
    Add { group: String, pattern: String },

    Remove { group: String, pattern: String },
}

pub fn run(cmd: PatternCommand) -> Result<()> {
    let catalog = Catalog::open()?;
    match cmd {
        PatternCommand::Add { group, pattern } => {
            catalog
                .registry()
                .add_pattern(&group, &pattern)
                .with_context(|| format!("failed to add pattern to '{group}'"))?;
            catalog.save()?;
            println!("{} Added pattern '{}' to '{}'", "✓".green(), pattern, group);
        }
        PatternCommand::Remove { group, pattern } => {
            catalog
                .registry()
                .remove_pattern(&group, &pattern)
                .with_context(|| format!("failed to remove pattern from '{group}'"))?;
            catalog.save()?;
            println!("{} Removed pattern '{}' from '{}'", "✓".green(), pattern, group);
        }
    }
    Ok(())
}
