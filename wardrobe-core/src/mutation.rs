//! Ordered edit commands for [`GroupRegistry::modify_group`](crate::registry::GroupRegistry::modify_group).

use serde::{Deserialize, Serialize};

use crate::config::compile_patterns;
use crate::error::GroupError;
use crate::types::{Group, GroupName, GroupPattern, GroupSettings};

/// One edit applied to a group. A list of these is applied in order to a copy
/// of the group; the copy replaces the original only if every edit succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum GroupMutation {
    AddWorld(String),
    /// Removing a world the group does not list is a no-op.
    RemoveWorld(String),
    SetWorlds(Vec<String>),
    AddPattern(String),
    RemovePattern(String),
    SetPatterns(Vec<String>),
    SetPriority(i32),
    SetParent(Option<GroupName>),
    ModifySettings(Vec<SettingsChange>),
}

/// A single settings flag update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flag", content = "value", rename_all = "snake_case")]
pub enum SettingsChange {
    ClearOnDeath(bool),
    SeparateGameModeInventories(bool),
    SaveHealth(bool),
    SaveHunger(bool),
    SaveExperience(bool),
    SavePotionEffects(bool),
    SaveEnderChest(bool),
    SaveGameMode(bool),
}

impl SettingsChange {
    pub fn apply(self, settings: &mut GroupSettings) {
        match self {
            SettingsChange::ClearOnDeath(v) => settings.clear_on_death = v,
            SettingsChange::SeparateGameModeInventories(v) => {
                settings.separate_game_mode_inventories = v
            }
            SettingsChange::SaveHealth(v) => settings.save_health = v,
            SettingsChange::SaveHunger(v) => settings.save_hunger = v,
            SettingsChange::SaveExperience(v) => settings.save_experience = v,
            SettingsChange::SavePotionEffects(v) => settings.save_potion_effects = v,
            SettingsChange::SaveEnderChest(v) => settings.save_ender_chest = v,
            SettingsChange::SaveGameMode(v) => settings.save_game_mode = v,
        }
    }
}

impl GroupMutation {
    pub fn apply(&self, group: &mut Group) -> Result<(), GroupError> {
        match self {
            GroupMutation::AddWorld(world) => {
                group.worlds.insert(world.clone());
            }
            GroupMutation::RemoveWorld(world) => {
                group.worlds.remove(world);
            }
            GroupMutation::SetWorlds(worlds) => {
                group.worlds = worlds.iter().cloned().collect();
            }
            GroupMutation::AddPattern(source) => add_pattern(group, source)?,
            GroupMutation::RemovePattern(source) => remove_pattern(group, source)?,
            GroupMutation::SetPatterns(sources) => {
                group.patterns = compile_patterns(sources.iter().cloned())?;
            }
            GroupMutation::SetPriority(priority) => group.priority = *priority,
            GroupMutation::SetParent(parent) => group.parent = parent.clone(),
            GroupMutation::ModifySettings(changes) => {
                for change in changes {
                    change.apply(&mut group.settings);
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn add_pattern(group: &mut Group, source: &str) -> Result<(), GroupError> {
    let pattern = GroupPattern::compile(source).map_err(|e| GroupError::InvalidPattern {
        pattern: source.to_string(),
        source: e,
    })?;
    if group.has_pattern(source) {
        return Err(GroupError::DuplicatePattern {
            group: group.name.clone(),
            pattern: source.to_string(),
        });
    }
    group.patterns.push(pattern);
    Ok(())
}

pub(crate) fn remove_pattern(group: &mut Group, source: &str) -> Result<(), GroupError> {
    let before = group.patterns.len();
    group.patterns.retain(|p| p.source() != source);
    if group.patterns.len() == before {
        return Err(GroupError::PatternNotFound {
            group: group.name.clone(),
            pattern: source.to_string(),
        });
    }
    Ok(())
}
