//! In-memory group catalog.
//!
//! Readers take a cheap `Arc` of the current [`GroupTable`] and never observe
//! a partially applied change: every mutation clones the table, edits the
//! copy, and swaps it in under the write lock. Edits are serialized by a
//! separate mutex so the catalog handed to the [`ConfigWriter`] always matches
//! the table that was just published.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::config::{ConfigWriter, GroupsConfig, DEFAULT_GROUP_NAME};
use crate::error::GroupError;
use crate::mutation::{self, GroupMutation};
use crate::types::{Group, GroupName, GroupSettings};

// ---------------------------------------------------------------------------
// 1. Table
// ---------------------------------------------------------------------------

/// Immutable view of every group at one point in time.
#[derive(Debug, Clone)]
pub struct GroupTable {
    groups: HashMap<GroupName, Arc<Group>>,
    default: GroupName,
}

impl GroupTable {
    /// Build a table from configuration.
    ///
    /// Exactly one group ends up flagged as default: the one named by
    /// `default_group`, synthesized empty when the file does not define it.
    pub fn from_config(config: &GroupsConfig) -> Result<Self, GroupError> {
        let default = if config.default_group.trim().is_empty() {
            GroupName::from(DEFAULT_GROUP_NAME)
        } else {
            GroupName::from(config.default_group.trim())
        };

        let mut groups = HashMap::with_capacity(config.groups.len() + 1);
        for (name, group_config) in &config.groups {
            let name = GroupName::from(name.as_str());
            let is_default = name == default;
            let group = group_config.to_group(name.clone(), is_default)?;
            groups.insert(name, Arc::new(group));
        }

        if !groups.contains_key(&default) {
            tracing::info!(group = %default, "default group missing from config; creating it");
            let mut group = Group::new(default.clone());
            group.is_default = true;
            groups.insert(default.clone(), Arc::new(group));
        }

        Ok(Self { groups, default })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Group>> {
        self.groups.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn default_name(&self) -> &GroupName {
        &self.default
    }

    pub fn default_group(&self) -> Arc<Group> {
        match self.groups.get(&self.default) {
            Some(group) => group.clone(),
            None => {
                let mut group = Group::new(self.default.clone());
                group.is_default = true;
                Arc::new(group)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Group>> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The catalog in its on-disk form.
    pub fn to_config(&self) -> GroupsConfig {
        GroupsConfig {
            default_group: self.default.0.clone(),
            groups: self
                .groups
                .iter()
                .map(|(name, group)| (name.0.clone(), group.to_config()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Registry
// ---------------------------------------------------------------------------

/// Fields for [`GroupRegistry::create_group`]. Everything is optional.
#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub settings: GroupSettings,
    pub worlds: Vec<String>,
    pub patterns: Vec<String>,
    pub priority: i32,
    pub parent: Option<GroupName>,
}

/// Thread-safe group catalog with write-through persistence.
pub struct GroupRegistry {
    table: RwLock<Arc<GroupTable>>,
    edit: Mutex<()>,
    writer: Arc<dyn ConfigWriter>,
}

impl std::fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("table", &self.table())
            .finish_non_exhaustive()
    }
}

impl GroupRegistry {
    pub fn new(config: &GroupsConfig, writer: Arc<dyn ConfigWriter>) -> Result<Self, GroupError> {
        Ok(Self {
            table: RwLock::new(Arc::new(GroupTable::from_config(config)?)),
            edit: Mutex::new(()),
            writer,
        })
    }

    /// The current table. Cheap; callers may hold it as long as they like.
    pub fn table(&self) -> Arc<GroupTable> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.table().get(name).cloned()
    }

    pub fn default_group(&self) -> Arc<Group> {
        self.table().default_group()
    }

    /// All groups, sorted by name.
    pub fn groups(&self) -> Vec<Arc<Group>> {
        let table = self.table();
        let mut groups: Vec<Arc<Group>> = table.iter().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    pub fn group_names(&self) -> Vec<GroupName> {
        self.groups().iter().map(|g| g.name.clone()).collect()
    }

    pub fn to_config(&self) -> GroupsConfig {
        self.table().to_config()
    }

    // -- CRUD ---------------------------------------------------------------

    pub fn create_group(
        &self,
        name: impl Into<GroupName>,
        spec: NewGroup,
    ) -> Result<Arc<Group>, GroupError> {
        let name = name.into();
        self.edit(|groups, _| {
            if groups.contains_key(&name) {
                return Err(GroupError::AlreadyExists(name.clone()));
            }
            let group = Arc::new(Group {
                name: name.clone(),
                worlds: spec.worlds.into_iter().collect(),
                patterns: crate::config::compile_patterns(spec.patterns)?,
                priority: spec.priority,
                parent: spec.parent,
                settings: spec.settings,
                restrictions: None,
                is_default: false,
            });
            groups.insert(name.clone(), group.clone());
            tracing::info!(group = %name, "group created");
            Ok(group)
        })
    }

    pub fn delete_group(&self, name: &str) -> Result<(), GroupError> {
        self.edit(|groups, default| {
            if default.as_str() == name {
                return Err(GroupError::DefaultGroup(default.clone()));
            }
            if groups.remove(name).is_none() {
                return Err(GroupError::NotFound(GroupName::from(name)));
            }
            tracing::info!(group = %name, "group deleted");
            Ok(())
        })
    }

    /// Apply `mutations` in order to a copy of the group and swap it in.
    ///
    /// If any mutation fails the group is left exactly as it was.
    pub fn modify_group(
        &self,
        name: &str,
        mutations: &[GroupMutation],
    ) -> Result<Arc<Group>, GroupError> {
        self.edit(|groups, _| {
            let current = groups
                .get(name)
                .ok_or_else(|| GroupError::NotFound(GroupName::from(name)))?;
            let mut copy = Group::clone(current);
            for mutation in mutations {
                mutation.apply(&mut copy)?;
            }
            let updated = Arc::new(copy);
            groups.insert(updated.name.clone(), updated.clone());
            tracing::info!(group = %name, edits = mutations.len(), "group modified");
            Ok(updated)
        })
    }

    /// Move `world` into `target`'s explicit set, removing it from every other group.
    pub fn assign_world_to_group(&self, world: &str, target: &str) -> Result<(), GroupError> {
        self.edit(|groups, _| {
            if !groups.contains_key(target) {
                return Err(GroupError::NotFound(GroupName::from(target)));
            }
            strip_world(groups, world);
            if let Some(group) = groups.get_mut(target) {
                Arc::make_mut(group).worlds.insert(world.to_string());
            }
            tracing::info!(world, group = target, "world assigned");
            Ok(())
        })
    }

    /// Remove `world` from every group's explicit set.
    pub fn unassign_world(&self, world: &str) {
        let _ = self.edit(|groups, _| {
            strip_world(groups, world);
            tracing::info!(world, "world unassigned");
            Ok(())
        });
    }

    pub fn add_pattern(&self, group: &str, pattern: &str) -> Result<(), GroupError> {
        self.edit(|groups, _| {
            let entry = groups
                .get_mut(group)
                .ok_or_else(|| GroupError::NotFound(GroupName::from(group)))?;
            let mut copy = Group::clone(entry);
            mutation::add_pattern(&mut copy, pattern)?;
            *entry = Arc::new(copy);
            tracing::info!(group, pattern, "pattern added");
            Ok(())
        })
    }

    pub fn remove_pattern(&self, group: &str, pattern: &str) -> Result<(), GroupError> {
        self.edit(|groups, _| {
            let entry = groups
                .get_mut(group)
                .ok_or_else(|| GroupError::NotFound(GroupName::from(group)))?;
            let mut copy = Group::clone(entry);
            mutation::remove_pattern(&mut copy, pattern)?;
            *entry = Arc::new(copy);
            tracing::info!(group, pattern, "pattern removed");
            Ok(())
        })
    }

    /// Discard the whole catalog and rebuild it from `config`.
    ///
    /// On error (an invalid pattern in the new config) the current catalog stays
    /// in place. Reloading does not write the catalog back.
    pub fn reload(&self, config: &GroupsConfig) -> Result<(), GroupError> {
        let next = Arc::new(GroupTable::from_config(config)?);
        let _guard = self.edit.lock().unwrap_or_else(PoisonError::into_inner);
        let count = next.len();
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = next;
        tracing::info!(groups = count, "group catalog reloaded");
        Ok(())
    }

    // -- internals ----------------------------------------------------------

    fn edit<T>(
        &self,
        f: impl FnOnce(&mut HashMap<GroupName, Arc<Group>>, &GroupName) -> Result<T, GroupError>,
    ) -> Result<T, GroupError> {
        let _guard = self.edit.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.table();
        let mut groups = current.groups.clone();
        let out = f(&mut groups, &current.default)?;

        let next = Arc::new(GroupTable {
            groups,
            default: current.default.clone(),
        });
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = next.clone();

        if let Err(err) = self.writer.write_groups(&next.to_config()) {
            tracing::warn!(error = %err, "failed to persist group catalog");
        }
        Ok(out)
    }
}

fn strip_world(groups: &mut HashMap<GroupName, Arc<Group>>, world: &str) {
    for group in groups.values_mut() {
        if group.contains_world(world) {
            Arc::make_mut(group).worlds.remove(world);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
