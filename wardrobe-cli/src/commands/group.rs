//! `wardrobe group create|delete|show|set|priority|parent`

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Subcommand, ValueEnum};
use colored::Colorize;
use tabled::{settings::Style, Table};

use wardrobe_core::{GroupMutation, GroupName, GroupSettings, NewGroup, SettingsChange};

use super::{Catalog, GroupJson, GroupRow};

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Create a group with optional worlds, patterns and settings.
    Create(CreateArgs),

    /// Delete a group. The default group cannot be deleted.
    Delete { name: String },

    /// Show one group's worlds, patterns and settings.
    Show {
        name: String,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Turn one settings flag on or off.
    Set {
        name: String,
        flag: SettingFlag,
        #[arg(action = ArgAction::Set)]
        value: bool,
    },

    /// Set the priority used to break ties between matching groups.
    Priority {
        name: String,
        #[arg(allow_negative_numbers = true)]
        priority: i32,
    },

    /// Set the parent group, or clear it when omitted.
    Parent { name: String, parent: Option<String> },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub name: String,

    /// Explicitly assigned world. Repeatable.
    #[arg(long = "world", short = 'w')]
    pub worlds: Vec<String>,

    /// Full-match world pattern. Repeatable.
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub priority: i32,

    #[arg(long)]
    pub parent: Option<String>,

    /// Keep a separate inventory per game mode.
    #[arg(long)]
    pub separate_gamemodes: bool,

    #[arg(long)]
    pub clear_on_death: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SettingFlag {
    ClearOnDeath,
    SeparateGamemodes,
    SaveHealth,
    SaveHunger,
    SaveExperience,
    SavePotionEffects,
    SaveEnderChest,
    SaveGamemode,
}

impl SettingFlag {
    fn change(self, value: bool) -> SettingsChange {
        match self {
            SettingFlag::ClearOnDeath => SettingsChange::ClearOnDeath(value),
            SettingFlag::SeparateGamemodes => SettingsChange::SeparateGameModeInventories(value),
            SettingFlag::SaveHealth => SettingsChange::SaveHealth(value),
            SettingFlag::SaveHunger => SettingsChange::SaveHunger(value),
            SettingFlag::SaveExperience => SettingsChange::SaveExperience(value),
            SettingFlag::SavePotionEffects => SettingsChange::SavePotionEffects(value),
            SettingFlag::SaveEnderChest => SettingsChange::SaveEnderChest(value),
            SettingFlag::SaveGamemode => SettingsChange::SaveGameMode(value),
        }
    }
}

pub fn run(cmd: GroupCommand) -> Result<()> {
    let catalog = Catalog::open()?;
    match cmd {
        GroupCommand::Create(args) => create(&catalog, args),
        GroupCommand::Delete { name } => {
            catalog
                .registry()
                .delete_group(&name)
                .with_context(|| format!("failed to delete '{name}'"))?;
            catalog.save()?;
            println!("{} Deleted group '{}'", "✓".green(), name);
            Ok(())
        }
        GroupCommand::Show { name, json } => show(&catalog, &name, json),
        GroupCommand::Set { name, flag, value } => modify(
            &catalog,
            &name,
            GroupMutation::ModifySettings(vec![flag.change(value)]),
        ),
        GroupCommand::Priority { name, priority } => {
            modify(&catalog, &name, GroupMutation::SetPriority(priority))
        }
        GroupCommand::Parent { name, parent } => modify(
            &catalog,
            &name,
            GroupMutation::SetParent(parent.map(GroupName::from)),
        ),
    }
}

fn create(catalog: &Catalog, args: CreateArgs) -> Result<()> {
    let spec = NewGroup {
        settings: GroupSettings {
            separate_game_mode_inventories: args.separate_gamemodes,
            clear_on_death: args.clear_on_death,
            ..GroupSettings::default()
        },
        worlds: args.worlds,
        patterns: args.patterns,
        priority: args.priority,
        parent: args.parent.map(GroupName::from),
    };
    let group = catalog
        .registry()
        .create_group(args.name.as_str(), spec)
        .with_context(|| format!("failed to create '{}'", args.name))?;
    catalog.save()?;
    println!("{} Created group '{}'", "✓".green(), group.name);
    Ok(())
}

fn show(catalog: &Catalog, name: &str, json: bool) -> Result<()> {
    let group = catalog
        .registry()
        .get_group(name)
        .with_context(|| format!("group '{name}' does not exist"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&GroupJson::from_group(&group))?);
        return Ok(());
    }
    let mut table = Table::new([GroupRow::from_group(&group)]);
    table.with(Style::rounded());
    println!("{table}");
    println!("{}", format_settings(&group.settings));
    Ok(())
}

fn modify(catalog: &Catalog, name: &str, mutation: GroupMutation) -> Result<()> {
    catalog
        .registry()
        .modify_group(name, &[mutation])
        .with_context(|| format!("failed to modify '{name}'"))?;
    catalog.save()?;
    println!("{} Updated group '{}'", "✓".green(), name);
    Ok(())
}

fn format_settings(settings: &GroupSettings) -> String {
    let flags = [
        ("clear-on-death", settings.clear_on_death),
        ("separate-gamemodes", settings.separate_game_mode_inventories),
        ("save-health", settings.save_health),
        ("save-hunger", settings.save_hunger),
        ("save-experience", settings.save_experience),
        ("save-potion-effects", settings.save_potion_effects),
        ("save-ender-chest", settings.save_ender_chest),
        ("save-gamemode", settings.save_game_mode),
    ];
    flags
        .iter()
        .map(|(flag, on)| {
            let state = if *on { "on".green() } else { "off".dimmed() };
            format!("  {flag}: {state}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
