//! Inventory switching coordinator: public surface and per-player job queues.
//!
//! Lifecycle triggers (`on_join`, `on_quit`, …) are plain synchronous calls
//! meant for the server's main thread. They only enqueue a job and return.
//! Each player has one worker task that drains that player's queue in order,
//! so at most one operation per player is ever in flight. A worker retires
//! once its queue is empty and the player is no longer tracked. A job that
//! panics is logged and the worker moves on to the next one.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use wardrobe_core::{
    BypassRegistry, GameMode, GroupName, GroupRegistry, PlayerId, Settings, Snapshot,
};

use crate::error::SwitchError;
use crate::events::{EventBus, InventoryListener, LoadReason};
use crate::ports::Ports;

/// Length of one server tick.
pub const TICK: Duration = Duration::from_millis(50);

/// Permission that bypasses every group. `wardrobe.bypass.<group>` bypasses one.
pub const BYPASS_PERMISSION: &str = "wardrobe.bypass";

/// What the coordinator currently knows about a player.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked {
    pub group: GroupName,
    /// Set only when the group separates game mode inventories.
    pub game_mode: Option<GameMode>,
    /// Snapshot most recently loaded or saved for the current context.
    pub active: Option<Arc<Snapshot>>,
}

/// Result of a manual operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Source and target were the same group; nothing was done.
    Unchanged,
    Cancelled,
    Bypassed,
}

impl Outcome {
    pub fn is_completed(self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SwitchError>>;

pub(crate) enum Job {
    Join,
    Quit {
        captured: Option<Snapshot>,
    },
    WorldChange {
        from: String,
        to: String,
        delay: Duration,
    },
    GameModeChange {
        from: GameMode,
        to: GameMode,
        delay: Duration,
    },
    Death,
    Save {
        group: Option<GroupName>,
        reply: Reply<Outcome>,
    },
    Load {
        group: GroupName,
        reason: LoadReason,
        reply: Reply<Outcome>,
    },
    Switch {
        from: GroupName,
        to: GroupName,
        reply: Reply<Outcome>,
    },
    Delete {
        group: GroupName,
        game_mode: Option<GameMode>,
        reply: Reply<bool>,
    },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::Join => "join",
            Job::Quit { .. } => "quit",
            Job::WorldChange { .. } => "world-change",
            Job::GameModeChange { .. } => "gamemode-change",
            Job::Death => "death",
            Job::Save { .. } => "save",
            Job::Load { .. } => "load",
            Job::Switch { .. } => "switch",
            Job::Delete { .. } => "delete",
        }
    }
}

pub(crate) struct Inner {
    pub(crate) groups: Arc<GroupRegistry>,
    pub(crate) bypass: Arc<BypassRegistry>,
    pub(crate) ports: Ports,
    pub(crate) events: EventBus,
    pub(crate) tracking: DashMap<PlayerId, Tracked>,
    /// Held while live contents and the tracked context change together, and
    /// while a quit reads both.
    pub(crate) live_locks: DashMap<PlayerId, Arc<Mutex<()>>>,
    settings: RwLock<Arc<Settings>>,
    workers: DashMap<PlayerId, mpsc::UnboundedSender<Job>>,
    runtime: Handle,
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// `runtime` runs the per-player workers.
    pub fn new(
        groups: Arc<GroupRegistry>,
        bypass: Arc<BypassRegistry>,
        ports: Ports,
        settings: Settings,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                groups,
                bypass,
                ports,
                events: EventBus::new(),
                tracking: DashMap::new(),
                live_locks: DashMap::new(),
                settings: RwLock::new(Arc::new(settings)),
                workers: DashMap::new(),
                runtime,
            }),
        }
    }

    pub fn groups(&self) -> &Arc<GroupRegistry> {
        &self.inner.groups
    }

    pub fn bypass(&self) -> &Arc<BypassRegistry> {
        &self.inner.bypass
    }

    pub fn register_listener(&self, listener: Arc<dyn InventoryListener>) {
        self.inner.events.register(listener);
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.inner.settings()
    }

    pub fn reload_settings(&self, settings: Settings) {
        *self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
        tracing::info!("coordinator settings reloaded");
    }

    // -----------------------------------------------------------------------
    // Lifecycle triggers
    // -----------------------------------------------------------------------

    pub fn on_join(&self, player: PlayerId) {
        self.inner.enqueue(player, Job::Join);
    }

    /// Captures the live state immediately, while the entity still exists, and
    /// queues the write behind any work already pending for the player.
    pub fn on_quit(&self, player: PlayerId) {
        let captured = self.inner.capture_for_quit(player);
        self.inner.enqueue(player, Job::Quit { captured });
    }

    pub fn on_world_change(&self, player: PlayerId, from: &str, to: &str) {
        let settings = self.settings();
        if !settings.features.save_on_world_change {
            return;
        }
        self.inner.enqueue(
            player,
            Job::WorldChange {
                from: from.to_string(),
                to: to.to_string(),
                delay: TICK * settings.performance.save_delay_ticks,
            },
        );
    }

    pub fn on_game_mode_change(&self, player: PlayerId, from: GameMode, to: GameMode) {
        let settings = self.settings();
        if !settings.features.save_on_gamemode_change || from == to {
            return;
        }
        self.inner.enqueue(
            player,
            Job::GameModeChange {
                from,
                to,
                delay: TICK * settings.performance.save_delay_ticks,
            },
        );
    }

    pub fn on_death(&self, player: PlayerId) {
        self.inner.enqueue(player, Job::Death);
    }

    // -----------------------------------------------------------------------
    // Manual API
    // -----------------------------------------------------------------------

    /// Save the live state under `group`, or under the tracked group when `None`.
    pub async fn save_inventory(
        &self,
        player: PlayerId,
        group: Option<GroupName>,
    ) -> Result<Outcome, SwitchError> {
        self.request(player, |reply| Job::Save { group, reply }).await
    }

    pub async fn load_inventory(
        &self,
        player: PlayerId,
        group: GroupName,
        reason: LoadReason,
    ) -> Result<Outcome, SwitchError> {
        self.request(player, |reply| Job::Load { group, reason, reply })
            .await
    }

    pub async fn switch_inventory(
        &self,
        player: PlayerId,
        from: GroupName,
        to: GroupName,
    ) -> Result<Outcome, SwitchError> {
        self.request(player, |reply| Job::Switch { from, to, reply })
            .await
    }

    /// Delete a stored snapshot. Returns `false` if nothing was stored.
    pub async fn delete_inventory(
        &self,
        player: PlayerId,
        group: GroupName,
        game_mode: Option<GameMode>,
    ) -> Result<bool, SwitchError> {
        self.request(player, |reply| Job::Delete { group, game_mode, reply })
            .await
    }

    pub fn active_snapshot(&self, player: PlayerId) -> Option<Arc<Snapshot>> {
        self.inner
            .tracking
            .get(&player)
            .and_then(|t| t.active.clone())
    }

    pub fn current_group(&self, player: PlayerId) -> Option<GroupName> {
        self.inner.tracking.get(&player).map(|t| t.group.clone())
    }

    pub fn tracked(&self, player: PlayerId) -> Option<Tracked> {
        self.inner.tracking.get(&player).map(|t| t.clone())
    }

    pub fn tracked_players(&self) -> Vec<(PlayerId, Tracked)> {
        let mut all: Vec<(PlayerId, Tracked)> = self
            .inner
            .tracking
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        all.sort_by_key(|(player, _)| *player);
        all
    }

    /// Number of players with a live worker task.
    pub fn active_workers(&self) -> usize {
        self.inner.workers.len()
    }

    /// Drop tracking for players whose group no longer exists, e.g. after a
    /// catalog reload. Returns how many entries were dropped.
    pub fn forget_missing_groups(&self) -> usize {
        let table = self.inner.groups.table();
        let mut dropped = 0usize;
        self.inner.tracking.retain(|player, tracked| {
            let keep = table.contains(tracked.group.as_str());
            if !keep {
                tracing::info!(%player, group = %tracked.group, "group removed; player untracked");
                dropped += 1;
            }
            keep
        });
        dropped
    }

    /// Save every tracked player, then let all workers drain and exit.
    /// Returns the number of snapshots written.
    pub async fn shutdown(&self) -> usize {
        let players: Vec<PlayerId> = self.inner.tracking.iter().map(|e| *e.key()).collect();
        let mut saved = 0usize;
        for player in players {
            match self.save_inventory(player, None).await {
                Ok(Outcome::Completed) => saved += 1,
                Ok(outcome) => {
                    tracing::debug!(%player, ?outcome, "shutdown save skipped");
                }
                Err(err) => {
                    tracing::warn!(%player, error = %err, "shutdown save failed");
                }
            }
        }
        self.inner.workers.clear();
        tracing::info!(saved, "coordinator shut down");
        saved
    }

    async fn request<T>(
        &self,
        player: PlayerId,
        job: impl FnOnce(Reply<T>) -> Job,
    ) -> Result<T, SwitchError> {
        let (tx, rx) = oneshot::channel();
        self.inner.enqueue(player, job(tx));
        rx.await
            .map_err(|_| SwitchError::ChannelClosed("coordinator reply"))?
    }
}

impl Inner {
    pub(crate) fn settings(&self) -> Arc<Settings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn enqueue(self: &Arc<Self>, player: PlayerId, job: Job) {
        match self.workers.entry(player) {
            Entry::Occupied(mut entry) => {
                if let Err(mpsc::error::SendError(job)) = entry.get().send(job) {
                    tracing::warn!(%player, "player worker stopped unexpectedly; restarting");
                    entry.insert(self.spawn_worker(player, job));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn_worker(player, job));
            }
        }
    }

    fn spawn_worker(self: &Arc<Self>, player: PlayerId, first: Job) -> mpsc::UnboundedSender<Job> {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(first);
        self.runtime.spawn(player_worker(self.clone(), player, rx));
        tx
    }
}

async fn player_worker(inner: Arc<Inner>, player: PlayerId, mut rx: mpsc::UnboundedReceiver<Job>) {
    tracing::debug!(%player, "player worker started");
    while let Some(job) = rx.recv().await {
        let kind = job.kind();
        if AssertUnwindSafe(inner.handle(player, job))
            .catch_unwind()
            .await
            .is_err()
        {
            tracing::error!(%player, job = kind, "player job panicked; continuing with queue");
        }

        // Senders only push while holding the map entry, so checking the queue
        // inside `remove_if` cannot miss a job.
        let retired = inner
            .workers
            .remove_if(&player, |_, _| {
                rx.is_empty() && !inner.tracking.contains_key(&player)
            })
            .is_some();
        if retired {
            tracing::debug!(%player, "player worker retired");
            break;
        }
    }
}
