//! Collaborator contracts consumed by the coordinator.
//!
//! Everything here is implemented by the embedding server. `LivePlayers`
//! methods are called from coordinator tasks; implementations marshal onto the
//! server's main thread as needed and must not block on I/O.

use std::sync::Arc;

use async_trait::async_trait;

use wardrobe_core::{GameMode, PlayerId, PlayerState, Snapshot, SnapshotKey};

use crate::error::StoreError;

/// Pluggable snapshot persistence.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored for the key yet.
    async fn load(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError>;

    /// `Ok(false)` when the backend declined the write.
    async fn save(&self, snapshot: &Snapshot) -> Result<bool, StoreError>;

    /// `Ok(false)` when there was nothing to delete.
    async fn delete(&self, key: &SnapshotKey) -> Result<bool, StoreError>;
}

/// Fire-and-forget player messaging by message key.
pub trait Notifier: Send + Sync {
    fn send(&self, player: PlayerId, message_key: &str, params: &[&str]);
}

pub trait Permissions: Send + Sync {
    fn has_permission(&self, player: PlayerId, permission: &str) -> bool;
}

/// Access to live player entities.
///
/// `apply` and `clear_inventory` run under a per-player lock that
/// [`Coordinator::on_quit`](crate::Coordinator::on_quit) also takes, so they
/// must not wait on the thread that reports quits.
pub trait LivePlayers: Send + Sync {
    fn is_online(&self, player: PlayerId) -> bool;

    fn name(&self, player: PlayerId) -> Option<String>;

    /// Name of the world the player is currently in.
    fn world(&self, player: PlayerId) -> Option<String>;

    fn game_mode(&self, player: PlayerId) -> Option<GameMode>;

    fn capture(&self, player: PlayerId) -> Option<PlayerState>;

    /// Replace live contents with the snapshot. Parts that are `None` in the
    /// snapshot are left as they are.
    fn apply(&self, player: PlayerId, snapshot: &Snapshot);

    /// Empty main, armor, offhand and ender chest contents.
    fn clear_inventory(&self, player: PlayerId);

    fn play_sound(&self, player: PlayerId, sound: &str, volume: f32, pitch: f32);
}

/// The collaborators a [`Coordinator`](crate::Coordinator) is built from.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn SnapshotStore>,
    pub players: Arc<dyn LivePlayers>,
    pub notifier: Arc<dyn Notifier>,
    pub permissions: Arc<dyn Permissions>,
}
