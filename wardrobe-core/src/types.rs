//! Domain types for the wardrobe group catalog.
//!
//! Identifiers are newtypes; every type that appears in configuration is
//! serializable via serde + serde_yaml.

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a group in the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(pub String);

impl GroupName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for GroupName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for GroupName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Stable identity of a player across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for PlayerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Game mode of a live player. Used as the optional second axis of a snapshot key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::Survival => write!(f, "survival"),
            GameMode::Creative => write!(f, "creative"),
            GameMode::Adventure => write!(f, "adventure"),
            GameMode::Spectator => write!(f, "spectator"),
        }
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "survival" => Ok(GameMode::Survival),
            "creative" => Ok(GameMode::Creative),
            "adventure" => Ok(GameMode::Adventure),
            "spectator" => Ok(GameMode::Spectator),
            other => Err(format!(
                "unknown game mode '{other}'; expected: survival, creative, adventure, spectator"
            )),
        }
    }
}

/// How a group's item restriction list is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestrictionMode {
    #[default]
    Blacklist,
    Whitelist,
}

// ---------------------------------------------------------------------------
// Group settings
// ---------------------------------------------------------------------------

fn enabled() -> bool {
    true
}

/// Per-group policy flags.
///
/// A `save_*` flag set to `false` excludes that part of the live state from
/// snapshots taken in the group, and leaves it untouched when one is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettings {
    #[serde(default)]
    pub clear_on_death: bool,
    #[serde(default)]
    pub separate_game_mode_inventories: bool,
    #[serde(default = "enabled")]
    pub save_health: bool,
    #[serde(default = "enabled")]
    pub save_hunger: bool,
    #[serde(default = "enabled")]
    pub save_experience: bool,
    #[serde(default = "enabled")]
    pub save_potion_effects: bool,
    #[serde(default = "enabled")]
    pub save_ender_chest: bool,
    #[serde(default)]
    pub save_game_mode: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            clear_on_death: false,
            separate_game_mode_inventories: false,
            save_health: true,
            save_hunger: true,
            save_experience: true,
            save_potion_effects: true,
            save_ender_chest: true,
            save_game_mode: false,
        }
    }
}

/// Item filter attached to a group. Enforcement lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Restrictions {
    #[serde(default)]
    pub mode: RestrictionMode,
    #[serde(default)]
    pub items: Vec<String>,
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// A compiled world-name pattern. Matches only when the whole name matches.
#[derive(Debug, Clone)]
pub struct GroupPattern {
    source: String,
    regex: Regex,
}

impl GroupPattern {
    pub fn compile(source: impl Into<String>) -> Result<Self, regex::Error> {
        let source = source.into();
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self { source, regex })
    }

    /// The pattern as written by the administrator.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, world: &str) -> bool {
        self.regex.is_match(world)
    }
}

impl PartialEq for GroupPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for GroupPattern {}

impl fmt::Display for GroupPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.source.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A named inventory namespace and the rules deciding which worlds belong to it.
///
/// Groups are shared as `Arc<Group>` and never mutated in place; the registry
/// swaps in a fresh value on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: GroupName,
    pub worlds: BTreeSet<String>,
    pub patterns: Vec<GroupPattern>,
    pub priority: i32,
    /// Informational only; no settings are inherited from the parent.
    pub parent: Option<GroupName>,
    pub settings: GroupSettings,
    pub restrictions: Option<Restrictions>,
    pub is_default: bool,
}

impl Group {
    /// An empty group with default settings.
    pub fn new(name: impl Into<GroupName>) -> Self {
        Self {
            name: name.into(),
            worlds: BTreeSet::new(),
            patterns: Vec::new(),
            priority: 0,
            parent: None,
            settings: GroupSettings::default(),
            restrictions: None,
            is_default: false,
        }
    }

    pub fn contains_world(&self, world: &str) -> bool {
        self.worlds.contains(world)
    }

    pub fn has_pattern(&self, source: &str) -> bool {
        self.patterns.iter().any(|p| p.source() == source)
    }

    /// True if any of this group's patterns fully matches `world`.
    pub fn matches_pattern(&self, world: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(world))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
