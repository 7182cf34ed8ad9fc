//! `wardrobe init [--force]`

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use wardrobe_core::config::{self, DEFAULT_GROUP_NAME};
use wardrobe_core::{GroupConfig, GroupsConfig, Settings};

/// Write starter config files.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite files that already exist.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let groups_path = config::groups_path_at(&home);
        if groups_path.exists() && !self.force {
            bail!(
                "{} already exists; pass --force to overwrite it",
                groups_path.display()
            );
        }

        config::save_groups_at(&home, &starter_catalog())
            .with_context(|| format!("failed to write {}", groups_path.display()))?;
        let settings_path = config::settings_path_at(&home);
        config::save_settings_at(&home, &Settings::default())
            .with_context(|| format!("failed to write {}", settings_path.display()))?;

        println!("{} Wrote {}", "✓".green(), groups_path.display());
        println!("{} Wrote {}", "✓".green(), settings_path.display());
        Ok(())
    }
}

/// A single default group holding the vanilla worlds.
fn starter_catalog() -> GroupsConfig {
    let mut catalog = GroupsConfig::default();
    catalog.groups.insert(
        DEFAULT_GROUP_NAME.to_string(),
        GroupConfig {
            worlds: vec![
                "world".to_string(),
                "world_nether".to_string(),
                "world_the_end".to_string(),
            ],
            ..GroupConfig::default()
        },
    );
    catalog
}
