//! `wardrobe check`: parse both config files and report problems.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use wardrobe_core::config;

use super::Catalog;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let catalog = Catalog::open()?;
        let home = super::home()?;
        let settings = config::load_settings_at(&home).context("failed to load settings.yaml")?;

        let registry = catalog.registry();
        let table = registry.table();
        println!(
            "{} {} groups, default '{}'",
            "✓".green(),
            table.len(),
            table.default_name()
        );
        println!(
            "{} save delay {} tick(s)",
            "✓".green(),
            settings.performance.save_delay_ticks
        );

        // A world listed by several groups resolves by priority; flag it so the
        // overlap is deliberate.
        let mut claims: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for group in table.iter() {
            for world in &group.worlds {
                claims.entry(world.as_str()).or_default().push(group.name.to_string());
            }
        }
        let mut warnings = 0usize;
        for (world, mut owners) in claims {
            if owners.len() < 2 {
                continue;
            }
            owners.sort();
            warnings += 1;
            let winner = table.resolve(world);
            println!(
                "{} '{}' is listed by {}; resolves to '{}'",
                "!".yellow(),
                world,
                owners.join(", "),
                winner.name
            );
        }

        if self.strict && warnings > 0 {
            bail!("{warnings} warning(s) in groups.yaml");
        }
        Ok(())
    }
}
