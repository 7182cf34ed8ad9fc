//! Runtime bypass flags.
//!
//! A player can be bypassed globally (`None`) or for a single group. These
//! flags live only in memory and are layered on top of the permission check
//! the coordinator performs.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

use crate::types::{GroupName, PlayerId};

#[derive(Debug, Default)]
pub struct BypassRegistry {
    entries: DashMap<PlayerId, HashSet<Option<GroupName>>>,
}

impl BypassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the flag was already present.
    pub fn add_bypass(&self, player: PlayerId, group: Option<&GroupName>) -> bool {
        self.entries.entry(player).or_default().insert(group.cloned())
    }

    /// Returns `false` if the flag was not present.
    pub fn remove_bypass(&self, player: PlayerId, group: Option<&GroupName>) -> bool {
        let key = group.cloned();
        let removed = match self.entries.get_mut(&player) {
            Some(mut set) => set.remove(&key),
            None => false,
        };
        self.entries.remove_if(&player, |_, set| set.is_empty());
        removed
    }

    /// True if the player holds the exact flag or the global one.
    ///
    /// With `group = None` only the global flag counts.
    pub fn has_bypass(&self, player: PlayerId, group: Option<&GroupName>) -> bool {
        let Some(set) = self.entries.get(&player) else {
            return false;
        };
        set.contains(&None) || group.is_some_and(|g| set.contains(&Some(g.clone())))
    }

    /// Drop every flag for `player`.
    pub fn clear(&self, player: PlayerId) {
        self.entries.remove(&player);
    }

    /// Copy of every flag, for admin inspection.
    pub fn bypasses(&self) -> HashMap<PlayerId, HashSet<Option<GroupName>>> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}
