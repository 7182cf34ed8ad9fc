//! YAML configuration files: the group catalog and the global settings.
//!
//! # Storage layout
//!
//! ```text
//! ~/.wardrobe/
//!   groups.yaml     (group catalog: mode 0600, rewritten after every registry change)
//!   settings.yaml   (feature flags, performance, global switch feedback)
//! ```
//!
//! # API pattern
//!
//! Every file function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GroupError};
use crate::types::{Group, GroupName, GroupPattern, GroupSettings, Restrictions};

pub const DEFAULT_GROUP_NAME: &str = "default";

// ---------------------------------------------------------------------------
// 1. Group catalog
// ---------------------------------------------------------------------------

/// On-disk form of a single group. This is also the external representation
/// handed to admin tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupConfig {
    #[serde(default)]
    pub worlds: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub settings: GroupSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrictions: Option<Restrictions>,
}

/// Root of `groups.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupsConfig {
    #[serde(default = "default_group_name")]
    pub default_group: String,
    #[serde(default)]
    pub groups: BTreeMap<String, GroupConfig>,
}

fn default_group_name() -> String {
    DEFAULT_GROUP_NAME.to_string()
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            default_group: default_group_name(),
            groups: BTreeMap::new(),
        }
    }
}

impl GroupConfig {
    /// Build a [`Group`], compiling every pattern.
    pub fn to_group(&self, name: GroupName, is_default: bool) -> Result<Group, GroupError> {
        Ok(Group {
            name,
            worlds: self.worlds.iter().cloned().collect(),
            patterns: compile_patterns(self.patterns.iter().cloned())?,
            priority: self.priority,
            parent: self.parent.clone().map(GroupName::from),
            settings: self.settings.clone(),
            restrictions: self.restrictions.clone(),
            is_default,
        })
    }
}

impl Group {
    pub fn to_config(&self) -> GroupConfig {
        GroupConfig {
            worlds: self.worlds.iter().cloned().collect(),
            patterns: self.patterns.iter().map(|p| p.source().to_string()).collect(),
            priority: self.priority,
            parent: self.parent.as_ref().map(|p| p.0.clone()),
            settings: self.settings.clone(),
            restrictions: self.restrictions.clone(),
        }
    }
}

/// Compile pattern sources in order, failing on the first invalid one.
pub fn compile_patterns(
    sources: impl IntoIterator<Item = String>,
) -> Result<Vec<GroupPattern>, GroupError> {
    sources
        .into_iter()
        .map(|source| {
            GroupPattern::compile(source.clone())
                .map_err(|e| GroupError::InvalidPattern { pattern: source, source: e })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 2. Global settings
// ---------------------------------------------------------------------------

/// Root of `settings.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub performance: Performance,
    #[serde(default)]
    pub global: GlobalSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default = "yes")]
    pub save_on_world_change: bool,
    #[serde(default = "yes")]
    pub save_on_gamemode_change: bool,
    /// Accepted for compatibility with existing files. Store I/O never runs on
    /// the caller's context regardless of this flag.
    #[serde(default = "yes")]
    pub async_saving: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            save_on_world_change: true,
            save_on_gamemode_change: true,
            async_saving: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performance {
    /// Server ticks to wait before handling a world or game mode change.
    #[serde(default = "one_tick")]
    pub save_delay_ticks: u32,
}

impl Default for Performance {
    fn default() -> Self {
        Self { save_delay_ticks: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default = "yes")]
    pub notify_on_switch: bool,
    /// Message key sent to the player after a group switch.
    #[serde(default = "switch_message_key")]
    pub switch_message: String,
    /// No sound is played when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_sound: Option<String>,
    #[serde(default = "unit_f32")]
    pub sound_volume: f32,
    #[serde(default = "unit_f32")]
    pub sound_pitch: f32,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            notify_on_switch: true,
            switch_message: switch_message_key(),
            switch_sound: None,
            sound_volume: 1.0,
            sound_pitch: 1.0,
        }
    }
}

fn yes() -> bool {
    true
}

fn one_tick() -> u32 {
    1
}

fn unit_f32() -> f32 {
    1.0
}

fn switch_message_key() -> String {
    "inventory.switched".to_string()
}

// ---------------------------------------------------------------------------
// 3. Paths
// ---------------------------------------------------------------------------

/// `<home>/.wardrobe/`
pub fn wardrobe_root(home: &Path) -> PathBuf {
    home.join(".wardrobe")
}

/// `<home>/.wardrobe/groups.yaml`: pure, no I/O.
pub fn groups_path_at(home: &Path) -> PathBuf {
    wardrobe_root(home).join("groups.yaml")
}

/// `<home>/.wardrobe/settings.yaml`: pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    wardrobe_root(home).join("settings.yaml")
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

/// Load a groups file from an explicit path.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_groups_file(path: &Path) -> Result<GroupsConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path: path.to_path_buf() });
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn load_groups_at(home: &Path) -> Result<GroupsConfig, ConfigError> {
    load_groups_file(&groups_path_at(home))
}

/// `load_groups_at` convenience wrapper.
pub fn load_groups() -> Result<GroupsConfig, ConfigError> {
    load_groups_at(&home()?)
}

/// Load settings; a missing file yields the defaults.
pub fn load_settings_file(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn load_settings_at(home: &Path) -> Result<Settings, ConfigError> {
    load_settings_file(&settings_path_at(home))
}

/// `load_settings_at` convenience wrapper.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_at(&home()?)
}

// ---------------------------------------------------------------------------
// 5. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write a groups file.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem).
pub fn save_groups_file(path: &Path, config: &GroupsConfig) -> Result<(), ConfigError> {
    write_yaml_atomic(path, &serde_yaml::to_string(config)?)
}

pub fn save_groups_at(home: &Path, config: &GroupsConfig) -> Result<(), ConfigError> {
    save_groups_file(&groups_path_at(home), config)
}

/// `save_groups_at` convenience wrapper.
pub fn save_groups(config: &GroupsConfig) -> Result<(), ConfigError> {
    save_groups_at(&home()?, config)
}

pub fn save_settings_at(home: &Path, settings: &Settings) -> Result<(), ConfigError> {
    write_yaml_atomic(&settings_path_at(home), &serde_yaml::to_string(settings)?)
}

fn write_yaml_atomic(path: &Path, yaml: &str) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            set_dir_permissions(dir)?;
        }
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.yaml".to_string());
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 6. Config writer collaborator
// ---------------------------------------------------------------------------

/// Receives the full catalog after every registry mutation.
pub trait ConfigWriter: Send + Sync {
    fn write_groups(&self, config: &GroupsConfig) -> Result<(), ConfigError>;
}

/// Writes the catalog to a `groups.yaml` file.
#[derive(Debug, Clone)]
pub struct YamlGroupsWriter {
    path: PathBuf,
}

impl YamlGroupsWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_home(home: &Path) -> Self {
        Self::new(groups_path_at(home))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigWriter for YamlGroupsWriter {
    fn write_groups(&self, config: &GroupsConfig) -> Result<(), ConfigError> {
        save_groups_file(&self.path, config)
    }
}

/// Discards every write. For embedders that own persistence themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConfigWriter;

impl ConfigWriter for NoopConfigWriter {
    fn write_groups(&self, _config: &GroupsConfig) -> Result<(), ConfigError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
