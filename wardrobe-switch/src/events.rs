//! Cancellable inventory events.
//!
//! Listeners see a mutable event record in priority order (`Lowest` first,
//! `Monitor` last). Any listener may cancel; the coordinator reads the final
//! state after every listener has run. A panicking listener is logged and
//! skipped; the remaining listeners still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use wardrobe_core::{GameMode, GroupName, PlayerId, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ListenerPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    /// Runs last. Intended for observation only.
    Monitor,
}

/// Why a snapshot is being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadReason {
    Join,
    GameModeChange,
    Command,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchCause {
    WorldChange,
    Api,
}

#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub player: PlayerId,
    pub group: GroupName,
    pub game_mode: Option<GameMode>,
    pub reason: LoadReason,
    cancelled: bool,
}

impl LoadEvent {
    pub fn new(
        player: PlayerId,
        group: GroupName,
        game_mode: Option<GameMode>,
        reason: LoadReason,
    ) -> Self {
        Self { player, group, game_mode, reason, cancelled: false }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Fired before a snapshot is handed to the store.
#[derive(Debug)]
pub struct SaveEvent<'a> {
    pub snapshot: &'a Snapshot,
    cancelled: bool,
}

impl<'a> SaveEvent<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot, cancelled: false }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Fired before a group switch. A listener may supply `override_snapshot`,
/// which is applied instead of fetching the target group's snapshot.
#[derive(Debug, Clone)]
pub struct SwitchEvent {
    pub player: PlayerId,
    pub from: GroupName,
    pub to: GroupName,
    pub cause: SwitchCause,
    pub override_snapshot: Option<Snapshot>,
    cancelled: bool,
}

impl SwitchEvent {
    pub fn new(player: PlayerId, from: GroupName, to: GroupName, cause: SwitchCause) -> Self {
        Self { player, from, to, cause, override_snapshot: None, cancelled: false }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Observer of inventory events. Every hook defaults to doing nothing.
pub trait InventoryListener: Send + Sync {
    fn priority(&self) -> ListenerPriority {
        ListenerPriority::Normal
    }

    fn on_load(&self, _event: &mut LoadEvent) {}

    fn on_save(&self, _event: &mut SaveEvent<'_>) {}

    fn on_switch(&self, _event: &mut SwitchEvent) {}
}

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn InventoryListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listeners of equal priority run in registration order.
    pub fn register(&self, listener: Arc<dyn InventoryListener>) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let at = listeners.partition_point(|l| l.priority() <= listener.priority());
        listeners.insert(at, listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the load may proceed.
    pub fn fire_load(&self, event: &mut LoadEvent) -> bool {
        self.dispatch("load", |listener| listener.on_load(event));
        !event.is_cancelled()
    }

    /// Returns `true` if the save may proceed.
    pub fn fire_save(&self, event: &mut SaveEvent<'_>) -> bool {
        self.dispatch("save", |listener| listener.on_save(event));
        !event.is_cancelled()
    }

    /// Returns `true` if the switch may proceed.
    pub fn fire_switch(&self, event: &mut SwitchEvent) -> bool {
        self.dispatch("switch", |listener| listener.on_switch(event));
        !event.is_cancelled()
    }

    fn dispatch(&self, kind: &'static str, mut call: impl FnMut(&dyn InventoryListener)) {
        // Snapshot the list so listeners may register others without deadlocking.
        let listeners: Vec<Arc<dyn InventoryListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| call(listener.as_ref()))).is_err() {
                tracing::error!(event = kind, "inventory listener panicked; continuing");
            }
        }
    }
}
