//! Wardrobe core library: group catalog, world resolution, bypass flags,
//! snapshots and configuration files.
//!
//! - [`types`]: newtypes, groups and their settings
//! - [`registry`]: the thread-safe group catalog
//! - [`resolver`]: world → group resolution
//! - [`mutation`]: ordered group edits
//! - [`bypass`]: runtime bypass flags
//! - [`snapshot`]: captured inventory and vital stats
//! - [`config`]: YAML files and the config writer collaborator
//! - [`error`]: [`GroupError`], [`ConfigError`]

pub mod bypass;
pub mod config;
pub mod error;
pub mod mutation;
pub mod registry;
pub mod resolver;
pub mod snapshot;
pub mod types;

pub use bypass::BypassRegistry;
pub use config::{ConfigWriter, GroupConfig, GroupsConfig, Settings, YamlGroupsWriter};
pub use error::{ConfigError, GroupError};
pub use mutation::{GroupMutation, SettingsChange};
pub use registry::{GroupRegistry, GroupTable, NewGroup};
pub use resolver::MatchKind;
pub use snapshot::{PlayerState, Snapshot, SnapshotKey};
pub use types::{GameMode, Group, GroupName, GroupSettings, PlayerId};
