//! `wardrobe resolve <world>...` and `wardrobe test-pattern <world> <group>`

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use super::Catalog;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// World names to resolve.
    #[arg(required = true)]
    pub worlds: Vec<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Resolution {
    world: String,
    group: String,
    matched_by: &'static str,
}

impl ResolveArgs {
    pub fn run(self) -> Result<()> {
        let catalog = Catalog::open()?;
        let table = catalog.registry().table();
        let resolutions: Vec<Resolution> = self
            .worlds
            .into_iter()
            .map(|world| {
                let (group, kind) = table.resolve_with_kind(&world);
                Resolution {
                    world,
                    group: group.name.to_string(),
                    matched_by: kind.as_str(),
                }
            })
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&resolutions)?);
            return Ok(());
        }
        for r in &resolutions {
            println!("{} -> {} ({})", r.world, r.group.bold(), r.matched_by.dimmed());
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct TestPatternArgs {
    pub world: String,
    pub group: String,
}

impl TestPatternArgs {
    pub fn run(self) -> Result<()> {
        let catalog = Catalog::open()?;
        let registry = catalog.registry();
        if registry.get_group(&self.group).is_none() {
            bail!("group '{}' does not exist", self.group);
        }
        if registry.test_pattern(&self.world, &self.group) {
            println!("{} '{}' matches a pattern of '{}'", "✓".green(), self.world, self.group);
        } else {
            println!("{} '{}' matches no pattern of '{}'", "✗".red(), self.world, self.group);
        }
        Ok(())
    }
}
