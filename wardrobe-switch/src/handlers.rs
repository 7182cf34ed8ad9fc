//! Job execution. Everything here runs on a player's worker task.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;

use wardrobe_core::{GameMode, Group, GroupName, PlayerId, Snapshot, SnapshotKey};

use crate::coordinator::{Inner, Job, Outcome, Tracked, BYPASS_PERMISSION};
use crate::error::{store_err, StoreError, SwitchError};
use crate::events::{LoadEvent, LoadReason, SaveEvent, SwitchCause, SwitchEvent};

/// Key axis for `group`: the game mode when the group separates inventories by
/// game mode, otherwise `None`.
fn axis_for(group: &Group, mode: GameMode) -> Option<GameMode> {
    group.settings.separate_game_mode_inventories.then_some(mode)
}

/// Run one store call. A panicking backend becomes [`StoreError::Panicked`].
async fn guarded<T>(call: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(StoreError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Inner {
    pub(crate) async fn handle(&self, player: PlayerId, job: Job) {
        match job {
            Job::Join => self.handle_join(player).await,
            Job::Quit { captured } => self.handle_quit(player, captured).await,
            Job::WorldChange { from, to, delay } => {
                if self.settle(player, delay).await {
                    self.handle_world_change(player, &from, &to).await;
                }
            }
            Job::GameModeChange { from, to, delay } => {
                if self.settle(player, delay).await {
                    self.handle_game_mode_change(player, from, to).await;
                }
            }
            Job::Death => self.handle_death(player).await,
            Job::Save { group, reply } => {
                let _ = reply.send(self.save(player, group).await);
            }
            Job::Load { group, reason, reply } => {
                let _ = reply.send(self.load(player, group, reason).await);
            }
            Job::Switch { from, to, reply } => {
                let _ = reply.send(self.switch(player, from, to, SwitchCause::Api).await);
            }
            Job::Delete { group, game_mode, reply } => {
                let _ = reply.send(self.delete(player, group, game_mode).await);
            }
        }
    }

    /// Wait out the configured save delay. Returns `false` if the player left.
    async fn settle(&self, player: PlayerId, delay: Duration) -> bool {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let online = self.online(player);
        if !online {
            tracing::debug!(%player, "player went offline before delayed job; abandoning");
        }
        online
    }

    fn online(&self, player: PlayerId) -> bool {
        self.ports.players.is_online(player)
    }

    /// Runtime flag or permission, global or scoped to `group`.
    pub(crate) fn is_bypassed(&self, player: PlayerId, group: Option<&GroupName>) -> bool {
        if self.bypass.has_bypass(player, group) {
            return true;
        }
        let permissions = &self.ports.permissions;
        if permissions.has_permission(player, BYPASS_PERMISSION) {
            return true;
        }
        group.is_some_and(|g| permissions.has_permission(player, &format!("{BYPASS_PERMISSION}.{g}")))
    }

    /// The catalog entry, or a default-settings stand-in for a group that was
    /// removed while a player was still tracked in it.
    fn group_or_placeholder(&self, name: &GroupName) -> Arc<Group> {
        self.groups
            .get_group(name.as_str())
            .unwrap_or_else(|| Arc::new(Group::new(name.clone())))
    }

    fn tracked(&self, player: PlayerId) -> Option<Tracked> {
        self.tracking.get(&player).map(|t| t.clone())
    }

    fn track(&self, player: PlayerId, group: GroupName, game_mode: Option<GameMode>, active: Option<Snapshot>) {
        self.tracking.insert(
            player,
            Tracked { group, game_mode, active: active.map(Arc::new) },
        );
    }

    fn live_lock(&self, player: PlayerId) -> Arc<Mutex<()>> {
        self.live_locks.entry(player).or_default().clone()
    }

    /// Put `snapshot` on the live player and record the new tracked context
    /// as one step. With no snapshot the live inventory is cleared when
    /// `clear_if_missing` is set and left alone otherwise.
    fn install(
        &self,
        player: PlayerId,
        group: GroupName,
        axis: Option<GameMode>,
        snapshot: Option<Snapshot>,
        clear_if_missing: bool,
    ) {
        let lock = self.live_lock(player);
        let _live = lock.lock().unwrap_or_else(PoisonError::into_inner);
        match &snapshot {
            Some(snapshot) => self.ports.players.apply(player, snapshot),
            None if clear_if_missing => self.ports.players.clear_inventory(player),
            None => {}
        }
        self.track(player, group, axis, snapshot);
    }

    /// Make `snapshot` the active one if it belongs to the tracked context.
    fn remember(&self, snapshot: &Snapshot) {
        if let Some(mut tracked) = self.tracking.get_mut(&snapshot.player) {
            if tracked.group == snapshot.group && tracked.game_mode == snapshot.game_mode {
                tracked.active = Some(Arc::new(snapshot.clone()));
            }
        }
    }

    fn capture(&self, player: PlayerId, group: &Group, axis: Option<GameMode>) -> Option<Snapshot> {
        let players = &self.ports.players;
        let state = players.capture(player)?;
        let name = players.name(player).unwrap_or_else(|| player.to_string());
        Some(Snapshot::capture(player, name, group, axis, state))
    }

    /// Reads the tracked context and the live contents under the live lock, so
    /// a worker midway through a switch cannot pair one group's items with
    /// another group's key.
    pub(crate) fn capture_for_quit(&self, player: PlayerId) -> Option<Snapshot> {
        let lock = self.live_lock(player);
        let _live = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let tracked = self.tracked(player)?;
        if self.is_bypassed(player, Some(&tracked.group)) {
            return None;
        }
        let group = self.group_or_placeholder(&tracked.group);
        self.capture(player, &group, tracked.game_mode)
    }

    /// Fire the save event and write. `Ok(false)` when a listener cancelled or
    /// the store declined.
    async fn persist(&self, snapshot: &Snapshot, operation: &'static str) -> Result<bool, SwitchError> {
        let allowed = {
            let mut event = SaveEvent::new(snapshot);
            self.events.fire_save(&mut event)
        };
        if !allowed {
            tracing::debug!(player = %snapshot.player, group = %snapshot.group, operation, "save cancelled by listener");
            return Ok(false);
        }
        match guarded(self.ports.store.save(snapshot)).await {
            Ok(true) => {
                tracing::debug!(player = %snapshot.player, group = %snapshot.group, operation, "snapshot saved");
                Ok(true)
            }
            Ok(false) => {
                tracing::warn!(player = %snapshot.player, group = %snapshot.group, operation, "store declined snapshot");
                Ok(false)
            }
            Err(err) => Err(store_err(snapshot.player, &snapshot.group, operation, err)),
        }
    }

    async fn fetch(
        &self,
        player: PlayerId,
        group: &GroupName,
        axis: Option<GameMode>,
        operation: &'static str,
    ) -> Result<Option<Snapshot>, SwitchError> {
        let key = SnapshotKey::new(player, group.clone(), axis);
        guarded(self.ports.store.load(&key))
            .await
            .map_err(|err| store_err(player, group, operation, err))
    }

    fn announce(&self, player: PlayerId, from: &GroupName, to: &GroupName) {
        let settings = self.settings();
        let global = &settings.global;
        if global.notify_on_switch {
            self.ports
                .notifier
                .send(player, &global.switch_message, &[from.as_str(), to.as_str()]);
        }
        if let Some(sound) = global.switch_sound.as_deref() {
            self.ports
                .players
                .play_sound(player, sound, global.sound_volume, global.sound_pitch);
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    async fn handle_join(&self, player: PlayerId) {
        let players = &self.ports.players;
        let (Some(world), Some(mode)) = (players.world(player), players.game_mode(player)) else {
            tracing::debug!(%player, "player left before join was processed");
            return;
        };
        let group = self.groups.resolve_group_for_world(&world);
        if self.is_bypassed(player, Some(&group.name)) {
            tracing::debug!(%player, group = %group.name, "join bypassed");
            return;
        }
        let axis = axis_for(&group, mode);

        let mut event = LoadEvent::new(player, group.name.clone(), axis, LoadReason::Join);
        if !self.events.fire_load(&mut event) {
            tracing::debug!(%player, group = %group.name, "join load cancelled by listener");
            return;
        }

        let snapshot = match self.fetch(player, &group.name, axis, "join").await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::error!(%player, group = %group.name, operation = "join", error = %err, "failed to load inventory");
                return;
            }
        };
        if !self.online(player) {
            tracing::debug!(%player, "player left during join load; abandoning");
            return;
        }
        tracing::info!(%player, group = %group.name, restored = snapshot.is_some(), "player tracked on join");
        self.install(player, group.name.clone(), axis, snapshot, false);
    }

    async fn handle_quit(&self, player: PlayerId, captured: Option<Snapshot>) {
        if let Some(snapshot) = captured {
            if let Err(err) = self.persist(&snapshot, "quit").await {
                tracing::error!(%player, group = %snapshot.group, operation = "quit", error = %err, "failed to save inventory on quit");
            }
        }
        if self.tracking.remove(&player).is_some() {
            tracing::info!(%player, "player untracked on quit");
        }
        self.live_locks
            .remove_if(&player, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// The live world at execution time decides the target, so several
    /// changes inside one delay window collapse into one switch.
    async fn handle_world_change(&self, player: PlayerId, from_world: &str, to_world: &str) {
        let world = self
            .ports
            .players
            .world(player)
            .unwrap_or_else(|| to_world.to_string());
        let to = self.groups.resolve_group_for_world(&world);
        if self.is_bypassed(player, Some(&to.name)) {
            tracing::debug!(%player, group = %to.name, "world change bypassed");
            return;
        }

        let tracked = self.tracked(player);
        let from = match &tracked {
            Some(t) => t.group.clone(),
            None => self.groups.resolve_group_for_world(from_world).name.clone(),
        };

        if from == to.name {
            let group = self.group_or_placeholder(&from);
            let axis = match &tracked {
                Some(t) => t.game_mode,
                None => self.ports.players.game_mode(player).and_then(|m| axis_for(&group, m)),
            };
            let Some(snapshot) = self.capture(player, &group, axis) else {
                return;
            };
            match self.persist(&snapshot, "world-change").await {
                Ok(true) => self.remember(&snapshot),
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(%player, group = %from, operation = "world-change", error = %err, "failed to save inventory");
                }
            }
            return;
        }

        match self.switch(player, from.clone(), to.name.clone(), SwitchCause::WorldChange).await {
            Ok(outcome) => {
                tracing::debug!(%player, from = %from, to = %to.name, ?outcome, "world change processed");
            }
            Err(SwitchError::Offline(_)) => {
                tracing::debug!(%player, "player went offline during switch; abandoning");
            }
            Err(err) => {
                tracing::error!(%player, from = %from, to = %to.name, operation = "switch", error = %err, "inventory switch failed");
            }
        }
    }

    async fn handle_game_mode_change(&self, player: PlayerId, from_mode: GameMode, to_mode: GameMode) {
        let players = &self.ports.players;
        let Some(live_mode) = players.game_mode(player) else {
            return;
        };
        let tracked = self.tracked(player);
        let group = match &tracked {
            Some(t) => self.group_or_placeholder(&t.group),
            None => match players.world(player) {
                Some(world) => self.groups.resolve_group_for_world(&world),
                None => return,
            },
        };
        if !group.settings.separate_game_mode_inventories {
            return;
        }
        let outgoing_mode = tracked.as_ref().and_then(|t| t.game_mode).unwrap_or(from_mode);
        if outgoing_mode == live_mode {
            tracing::debug!(%player, requested = %to_mode, "game mode change coalesced");
            return;
        }
        if self.is_bypassed(player, Some(&group.name)) {
            tracing::debug!(%player, group = %group.name, "game mode change bypassed");
            return;
        }

        let Some(mut outgoing) = self.capture(player, &group, Some(outgoing_mode)) else {
            return;
        };
        // The live mode has already changed; the stored one must be the mode
        // these contents belonged to.
        if outgoing.restore_game_mode.is_some() {
            outgoing.restore_game_mode = Some(outgoing_mode);
        }
        if let Err(err) = self.persist(&outgoing, "gamemode-save").await {
            tracing::error!(%player, group = %group.name, operation = "gamemode-save", error = %err, "failed to save inventory");
            return;
        }

        let mut event = LoadEvent::new(player, group.name.clone(), Some(live_mode), LoadReason::GameModeChange);
        if !self.events.fire_load(&mut event) {
            tracing::debug!(%player, group = %group.name, "game mode load cancelled by listener");
            return;
        }
        let incoming = match self.fetch(player, &group.name, Some(live_mode), "gamemode-load").await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::error!(%player, group = %group.name, operation = "gamemode-load", error = %err, "failed to load inventory");
                return;
            }
        };
        if !self.online(player) {
            return;
        }
        tracing::info!(%player, group = %group.name, from = %outgoing_mode, to = %live_mode, "game mode inventory swapped");
        self.install(player, group.name.clone(), Some(live_mode), incoming, true);
    }

    async fn handle_death(&self, player: PlayerId) {
        let Some(tracked) = self.tracked(player) else {
            return;
        };
        let group = self.group_or_placeholder(&tracked.group);
        if !group.settings.clear_on_death || self.is_bypassed(player, Some(&group.name)) {
            return;
        }
        let key = SnapshotKey::new(player, tracked.group.clone(), tracked.game_mode);
        if let Err(err) = guarded(self.ports.store.delete(&key)).await {
            tracing::error!(%player, group = %group.name, operation = "death", error = %err, "failed to clear stored inventory");
            return;
        }
        if !self.online(player) {
            return;
        }
        {
            let lock = self.live_lock(player);
            let _live = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.ports.players.clear_inventory(player);
            if let Some(mut tracked) = self.tracking.get_mut(&player) {
                tracked.active = None;
            }
        }
        tracing::info!(%player, group = %group.name, "inventory cleared on death");
    }

    // -----------------------------------------------------------------------
    // Manual operations
    // -----------------------------------------------------------------------

    async fn save(&self, player: PlayerId, group: Option<GroupName>) -> Result<Outcome, SwitchError> {
        let tracked = self.tracked(player);
        let name = group
            .or_else(|| tracked.as_ref().map(|t| t.group.clone()))
            .ok_or(SwitchError::NotTracked(player))?;
        if self.is_bypassed(player, Some(&name)) {
            return Ok(Outcome::Bypassed);
        }

        let is_tracked_group = tracked.as_ref().is_some_and(|t| t.group == name);
        let group = match self.groups.get_group(name.as_str()) {
            Some(group) => group,
            None if is_tracked_group => self.group_or_placeholder(&name),
            None => return Err(SwitchError::UnknownGroup(name)),
        };
        let axis = match &tracked {
            Some(t) if is_tracked_group => t.game_mode,
            _ => {
                let mode = self.ports.players.game_mode(player).ok_or(SwitchError::Offline(player))?;
                axis_for(&group, mode)
            }
        };

        let snapshot = self.capture(player, &group, axis).ok_or(SwitchError::Offline(player))?;
        if self.persist(&snapshot, "save").await? {
            self.remember(&snapshot);
            Ok(Outcome::Completed)
        } else {
            Ok(Outcome::Cancelled)
        }
    }

    async fn load(&self, player: PlayerId, name: GroupName, reason: LoadReason) -> Result<Outcome, SwitchError> {
        let group = self
            .groups
            .get_group(name.as_str())
            .ok_or_else(|| SwitchError::UnknownGroup(name.clone()))?;
        if self.is_bypassed(player, Some(&name)) {
            return Ok(Outcome::Bypassed);
        }
        let mode = self.ports.players.game_mode(player).ok_or(SwitchError::Offline(player))?;
        let axis = axis_for(&group, mode);

        let mut event = LoadEvent::new(player, name.clone(), axis, reason);
        if !self.events.fire_load(&mut event) {
            return Ok(Outcome::Cancelled);
        }
        let snapshot = self.fetch(player, &name, axis, "load").await?;
        if !self.online(player) {
            return Err(SwitchError::Offline(player));
        }
        tracing::info!(%player, group = %name, ?reason, restored = snapshot.is_some(), "inventory loaded");
        self.install(player, name, axis, snapshot, false);
        Ok(Outcome::Completed)
    }

    /// Save under `from`, then apply `to`. A failed save leaves live state and
    /// tracking untouched.
    pub(crate) async fn switch(
        &self,
        player: PlayerId,
        from: GroupName,
        to: GroupName,
        cause: SwitchCause,
    ) -> Result<Outcome, SwitchError> {
        if from == to {
            return Ok(Outcome::Unchanged);
        }
        let to_group = self
            .groups
            .get_group(to.as_str())
            .ok_or_else(|| SwitchError::UnknownGroup(to.clone()))?;
        if self.is_bypassed(player, Some(&to)) {
            return Ok(Outcome::Bypassed);
        }
        let mode = self.ports.players.game_mode(player).ok_or(SwitchError::Offline(player))?;
        let from_group = self.group_or_placeholder(&from);
        let from_axis = self
            .tracking
            .get(&player)
            .filter(|t| t.group == from)
            .map(|t| t.game_mode)
            .unwrap_or_else(|| axis_for(&from_group, mode));
        let to_axis = axis_for(&to_group, mode);

        let mut event = SwitchEvent::new(player, from.clone(), to.clone(), cause);
        if !self.events.fire_switch(&mut event) {
            tracing::debug!(%player, from = %from, to = %to, "switch cancelled by listener");
            return Ok(Outcome::Cancelled);
        }

        let outgoing = self
            .capture(player, &from_group, from_axis)
            .ok_or(SwitchError::Offline(player))?;
        self.persist(&outgoing, "switch-save").await?;
        if !self.online(player) {
            return Err(SwitchError::Offline(player));
        }

        let incoming = match event.override_snapshot.take() {
            Some(snapshot) => Some(snapshot),
            None => {
                let snapshot = self.fetch(player, &to, to_axis, "switch-load").await?;
                if !self.online(player) {
                    return Err(SwitchError::Offline(player));
                }
                snapshot
            }
        };
        self.install(player, to.clone(), to_axis, incoming, true);
        tracing::info!(%player, from = %from, to = %to, ?cause, "inventory switched");
        self.announce(player, &from, &to);
        Ok(Outcome::Completed)
    }

    async fn delete(
        &self,
        player: PlayerId,
        group: GroupName,
        game_mode: Option<GameMode>,
    ) -> Result<bool, SwitchError> {
        let key = SnapshotKey::new(player, group.clone(), game_mode);
        let deleted = guarded(self.ports.store.delete(&key))
            .await
            .map_err(|err| store_err(player, &group, "delete", err))?;
        if let Some(mut tracked) = self.tracking.get_mut(&player) {
            if tracked.active.as_ref().is_some_and(|s| s.key() == key) {
                tracked.active = None;
            }
        }
        tracing::info!(%player, group = %group, deleted, "stored inventory deleted");
        Ok(deleted)
    }
}
