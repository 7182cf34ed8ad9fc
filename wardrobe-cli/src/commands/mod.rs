pub mod check;
pub mod group;
pub mod groups;
pub mod init;
pub mod pattern;
pub mod resolve;
pub mod world;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tabled::Tabled;

use wardrobe_core::config::{self, NoopConfigWriter};
use wardrobe_core::{Group, GroupConfig, GroupRegistry};

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// The on-disk catalog, loaded into a registry for editing.
///
/// Edits go through [`GroupRegistry`] so the CLI enforces exactly the same
/// rules as a running server; [`Catalog::save`] writes the result back.
pub(crate) struct Catalog {
    home: PathBuf,
    registry: GroupRegistry,
}

impl Catalog {
    pub fn open() -> Result<Self> {
        let home = home()?;
        let groups = config::load_groups_at(&home)
            .context("failed to load groups.yaml; run `wardrobe init` first")?;
        let registry = GroupRegistry::new(&groups, Arc::new(NoopConfigWriter))
            .context("groups.yaml contains an invalid group")?;
        Ok(Self { home, registry })
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }

    pub fn save(&self) -> Result<()> {
        config::save_groups_at(&self.home, &self.registry.to_config())
            .context("failed to write groups.yaml")
    }
}

#[derive(Tabled)]
pub(crate) struct GroupRow {
    #[tabled(rename = "group")]
    name: String,
    #[tabled(rename = "priority")]
    priority: i32,
    #[tabled(rename = "worlds")]
    worlds: String,
    #[tabled(rename = "patterns")]
    patterns: String,
    #[tabled(rename = "parent")]
    parent: String,
}

impl GroupRow {
    pub fn from_group(group: &Group) -> Self {
        let name = if group.is_default {
            format!("{} (default)", group.name)
        } else {
            group.name.to_string()
        };
        Self {
            name,
            priority: group.priority,
            worlds: join_or_dash(group.worlds.iter().map(String::as_str)),
            patterns: join_or_dash(group.patterns.iter().map(|p| p.source())),
            parent: group
                .parent
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct GroupJson {
    name: String,
    is_default: bool,
    #[serde(flatten)]
    config: GroupConfig,
}

impl GroupJson {
    pub fn from_group(group: &Group) -> Self {
        Self {
            name: group.name.to_string(),
            is_default: group.is_default,
            config: group.to_config(),
        }
    }
}

fn join_or_dash<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}
