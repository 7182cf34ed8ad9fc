//! Captured player state for one (group, optional game mode) context.
//!
//! Item contents are opaque to this crate: a stack is an item type, an amount
//! and free-form metadata that the embedding server round-trips untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GameMode, Group, GroupName, PlayerId};

/// Sparse slot index → item mapping.
pub type SlotMap = BTreeMap<u16, ItemStack>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_type: String,
    pub amount: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl ItemStack {
    pub fn new(item_type: impl Into<String>, amount: u32) -> Self {
        Self {
            item_type: item_type.into(),
            amount,
            meta: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InventoryContents {
    #[serde(default)]
    pub main: SlotMap,
    #[serde(default)]
    pub armor: SlotMap,
    #[serde(default)]
    pub offhand: SlotMap,
}

impl InventoryContents {
    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.armor.is_empty() && self.offhand.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f64,
    pub max: f64,
}

impl Default for Health {
    fn default() -> Self {
        Self { current: 20.0, max: 20.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hunger {
    pub food_level: i32,
    pub saturation: f32,
    pub exhaustion: f32,
}

impl Default for Hunger {
    fn default() -> Self {
        Self { food_level: 20, saturation: 5.0, exhaustion: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Experience {
    /// Progress towards the next level, `0.0..1.0`.
    pub progress: f32,
    pub level: i32,
    pub total: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotionEffect {
    pub effect_type: String,
    pub duration_ticks: i32,
    pub amplifier: i32,
    #[serde(default)]
    pub ambient: bool,
    #[serde(default = "visible")]
    pub particles: bool,
}

fn visible() -> bool {
    true
}

/// Vital stats in a snapshot. A `None` part was excluded by group settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct VitalStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunger: Option<Hunger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<Experience>,
}

/// Everything the live entity currently holds, as read from the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerState {
    pub inventory: InventoryContents,
    pub ender_chest: SlotMap,
    pub health: Health,
    pub hunger: Hunger,
    pub experience: Experience,
    pub effects: Vec<PotionEffect>,
    pub game_mode: GameMode,
}

/// Store key of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub player: PlayerId,
    pub group: GroupName,
    pub game_mode: Option<GameMode>,
}

impl SnapshotKey {
    pub fn new(player: PlayerId, group: GroupName, game_mode: Option<GameMode>) -> Self {
        Self { player, group, game_mode }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub player: PlayerId,
    pub player_name: String,
    pub group: GroupName,
    /// Key axis; only set when the group separates game mode inventories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_mode: Option<GameMode>,
    pub inventory: InventoryContents,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ender_chest: Option<SlotMap>,
    #[serde(default)]
    pub vitals: VitalStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Vec<PotionEffect>>,
    /// Game mode to put the player back into when the snapshot is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_game_mode: Option<GameMode>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Capture `state` for `group`, dropping every part the group does not save.
    pub fn capture(
        player: PlayerId,
        player_name: impl Into<String>,
        group: &Group,
        game_mode: Option<GameMode>,
        state: PlayerState,
    ) -> Self {
        let settings = &group.settings;
        Self {
            player,
            player_name: player_name.into(),
            group: group.name.clone(),
            game_mode,
            inventory: state.inventory,
            ender_chest: settings.save_ender_chest.then_some(state.ender_chest),
            vitals: VitalStats {
                health: settings.save_health.then_some(state.health),
                hunger: settings.save_hunger.then_some(state.hunger),
                experience: settings.save_experience.then_some(state.experience),
            },
            effects: settings.save_potion_effects.then_some(state.effects),
            restore_game_mode: settings.save_game_mode.then_some(state.game_mode),
            timestamp: Utc::now(),
        }
    }

    pub fn key(&self) -> SnapshotKey {
        SnapshotKey::new(self.player, self.group.clone(), self.game_mode)
    }
}
