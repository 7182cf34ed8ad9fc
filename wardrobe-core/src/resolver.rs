//! World → group resolution.
//!
//! Resolution runs in three tiers and never fails:
//!
//! 1. groups that list the world explicitly,
//! 2. groups with a pattern that fully matches the world,
//! 3. the default group.
//!
//! Priority only orders candidates inside a tier. An explicit listing beats
//! any pattern match regardless of priority. Equal priorities are broken by
//! the lexicographically smallest group name.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::registry::{GroupRegistry, GroupTable};
use crate::types::Group;

/// Which tier produced a resolution. Useful for admin tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Explicit,
    Pattern,
    Default,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Explicit => "explicit",
            MatchKind::Pattern => "pattern",
            MatchKind::Default => "default",
        }
    }
}

impl GroupTable {
    pub fn resolve(&self, world: &str) -> Arc<Group> {
        self.resolve_with_kind(world).0
    }

    pub fn resolve_with_kind(&self, world: &str) -> (Arc<Group>, MatchKind) {
        if let Some(group) = best(self.iter().filter(|g| g.contains_world(world))) {
            return (group.clone(), MatchKind::Explicit);
        }
        if let Some(group) = best(self.iter().filter(|g| g.matches_pattern(world))) {
            return (group.clone(), MatchKind::Pattern);
        }
        (self.default_group(), MatchKind::Default)
    }

    /// Evaluate only `group`'s patterns against `world`. Unknown groups never match.
    pub fn test_pattern(&self, world: &str, group: &str) -> bool {
        self.get(group)
            .map(|g| g.matches_pattern(world))
            .unwrap_or(false)
    }
}

impl GroupRegistry {
    pub fn resolve_group_for_world(&self, world: &str) -> Arc<Group> {
        self.table().resolve(world)
    }

    pub fn resolve_with_kind(&self, world: &str) -> (Arc<Group>, MatchKind) {
        self.table().resolve_with_kind(world)
    }

    pub fn test_pattern(&self, world: &str, group: &str) -> bool {
        self.table().test_pattern(world, group)
    }
}

fn best<'a>(candidates: impl Iterator<Item = &'a Arc<Group>>) -> Option<&'a Arc<Group>> {
    candidates.max_by(|a, b| rank(a, b))
}

fn rank(a: &Group, b: &Group) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.name.cmp(&a.name))
}
