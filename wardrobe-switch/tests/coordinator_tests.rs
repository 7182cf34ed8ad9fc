use std::collections::{HashMap, HashSet};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::assert_ok;

use wardrobe_core::config::NoopConfigWriter;
use wardrobe_core::snapshot::ItemStack;
use wardrobe_core::{
    BypassRegistry, GameMode, Group, GroupConfig, GroupName, GroupRegistry, GroupSettings,
    GroupsConfig, PlayerId, PlayerState, Settings, Snapshot, SnapshotKey,
};
use wardrobe_switch::{
    Coordinator, InventoryListener, ListenerPriority, LivePlayers, LoadEvent, LoadReason,
    MemorySnapshotStore, Notifier, Outcome, Permissions, Ports, SaveEvent, SnapshotStore,
    StoreError, StoreOp, SwitchError, SwitchEvent,
};

// ---------------------------------------------------------------------------
// Fake server
// ---------------------------------------------------------------------------

struct FakePlayer {
    world: String,
    state: PlayerState,
    online: bool,
}

#[derive(Default)]
struct FakeServer {
    players: Mutex<HashMap<PlayerId, FakePlayer>>,
    granted: Mutex<HashSet<(PlayerId, String)>>,
    messages: Mutex<Vec<(PlayerId, String, Vec<String>)>>,
    sounds: Mutex<Vec<(PlayerId, String)>>,
    cleared: Mutex<Vec<PlayerId>>,
    apply_gate: Mutex<Option<ApplyGate>>,
}

/// Parks the next `apply` after it has changed live state, until released.
struct ApplyGate {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

impl FakeServer {
    fn connect(&self, world: &str, mode: GameMode) -> PlayerId {
        let player = PlayerId::new_v4();
        let state = PlayerState { game_mode: mode, ..PlayerState::default() };
        self.players
            .lock()
            .unwrap()
            .insert(player, FakePlayer { world: world.to_string(), state, online: true });
        player
    }

    fn with<R>(&self, player: PlayerId, f: impl FnOnce(&mut FakePlayer) -> R) -> R {
        let mut players = self.players.lock().unwrap();
        f(players.get_mut(&player).expect("known player"))
    }

    fn give(&self, player: PlayerId, item: &str) {
        self.with(player, |p| {
            let slot = p.state.inventory.main.len() as u16;
            p.state.inventory.main.insert(slot, ItemStack::new(item, 1));
        });
    }

    fn move_to(&self, player: PlayerId, world: &str) {
        self.with(player, |p| p.world = world.to_string());
    }

    fn set_mode(&self, player: PlayerId, mode: GameMode) {
        self.with(player, |p| p.state.game_mode = mode);
    }

    fn disconnect(&self, player: PlayerId) {
        self.with(player, |p| p.online = false);
    }

    fn holding(&self, player: PlayerId) -> Vec<String> {
        self.with(player, |p| {
            p.state.inventory.main.values().map(|s| s.item_type.clone()).collect()
        })
    }

    fn grant(&self, player: PlayerId, permission: &str) {
        self.granted.lock().unwrap().insert((player, permission.to_string()));
    }

    fn messages(&self) -> Vec<(PlayerId, String, Vec<String>)> {
        self.messages.lock().unwrap().clone()
    }

    /// Returns (signalled once the next apply has run, send to let it return).
    fn gate_next_apply(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.apply_gate.lock().unwrap() =
            Some(ApplyGate { entered: entered_tx, release: release_rx });
        (entered_rx, release_tx)
    }
}

impl LivePlayers for FakeServer {
    fn is_online(&self, player: PlayerId) -> bool {
        self.players.lock().unwrap().get(&player).is_some_and(|p| p.online)
    }

    fn name(&self, _player: PlayerId) -> Option<String> {
        Some("Steve".to_string())
    }

    fn world(&self, player: PlayerId) -> Option<String> {
        let players = self.players.lock().unwrap();
        players.get(&player).filter(|p| p.online).map(|p| p.world.clone())
    }

    fn game_mode(&self, player: PlayerId) -> Option<GameMode> {
        let players = self.players.lock().unwrap();
        players.get(&player).filter(|p| p.online).map(|p| p.state.game_mode)
    }

    fn capture(&self, player: PlayerId) -> Option<PlayerState> {
        let players = self.players.lock().unwrap();
        players.get(&player).map(|p| p.state.clone())
    }

    fn apply(&self, player: PlayerId, snapshot: &Snapshot) {
        self.with(player, |p| {
            p.state.inventory = snapshot.inventory.clone();
            if let Some(ender_chest) = &snapshot.ender_chest {
                p.state.ender_chest = ender_chest.clone();
            }
            if let Some(mode) = snapshot.restore_game_mode {
                p.state.game_mode = mode;
            }
        });
        let gate = self.apply_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
    }

    fn clear_inventory(&self, player: PlayerId) {
        self.with(player, |p| {
            p.state.inventory = Default::default();
            p.state.ender_chest.clear();
        });
        self.cleared.lock().unwrap().push(player);
    }

    fn play_sound(&self, player: PlayerId, sound: &str, _volume: f32, _pitch: f32) {
        self.sounds.lock().unwrap().push((player, sound.to_string()));
    }
}

impl Notifier for FakeServer {
    fn send(&self, player: PlayerId, message_key: &str, params: &[&str]) {
        self.messages.lock().unwrap().push((
            player,
            message_key.to_string(),
            params.iter().map(|p| p.to_string()).collect(),
        ));
    }
}

impl Permissions for FakeServer {
    fn has_permission(&self, player: PlayerId, permission: &str) -> bool {
        self.granted.lock().unwrap().contains(&(player, permission.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    coordinator: Coordinator,
    store: Arc<MemorySnapshotStore>,
    server: Arc<FakeServer>,
}

fn catalog() -> GroupsConfig {
    let mut config = GroupsConfig::default();
    config.groups.insert(
        "survival".to_string(),
        GroupConfig {
            worlds: vec!["world".to_string(), "world_nether".to_string()],
            settings: GroupSettings { clear_on_death: true, ..GroupSettings::default() },
            ..GroupConfig::default()
        },
    );
    config.groups.insert(
        "creative".to_string(),
        GroupConfig {
            worlds: vec!["creative".to_string()],
            settings: GroupSettings {
                separate_game_mode_inventories: true,
                ..GroupSettings::default()
            },
            ..GroupConfig::default()
        },
    );
    config
}

fn coordinator_over(
    store: Arc<dyn SnapshotStore>,
    server: Arc<FakeServer>,
    settings: Settings,
) -> Coordinator {
    let groups = Arc::new(GroupRegistry::new(&catalog(), Arc::new(NoopConfigWriter)).unwrap());
    let ports = Ports {
        store,
        players: server.clone(),
        notifier: server.clone(),
        permissions: server,
    };
    Coordinator::new(
        groups,
        Arc::new(BypassRegistry::new()),
        ports,
        settings,
        tokio::runtime::Handle::current(),
    )
}

fn harness_with(store: MemorySnapshotStore, settings: Settings) -> Harness {
    let store = Arc::new(store);
    let server = Arc::new(FakeServer::default());
    let coordinator = coordinator_over(store.clone(), server.clone(), settings);
    Harness { coordinator, store, server }
}

fn without_delay() -> Settings {
    let mut settings = Settings::default();
    settings.performance.save_delay_ticks = 0;
    settings
}

fn items(snapshot: &Snapshot) -> Vec<String> {
    snapshot.inventory.main.values().map(|s| s.item_type.clone()).collect()
}

fn harness() -> Harness {
    harness_with(MemorySnapshotStore::new(), Settings::default())
}

/// Let every queued job run to completion. Time is paused, so sleeping
/// auto-advances the clock once all workers are idle.
async fn drain() {
    tokio::time::sleep(Duration::from_secs(5)).await;
}

fn key(player: PlayerId, group: &str, mode: Option<GameMode>) -> SnapshotKey {
    SnapshotKey::new(player, GroupName::from(group), mode)
}

fn stored_with(player: PlayerId, group: &str, mode: Option<GameMode>, item: &str) -> Snapshot {
    let mut state = PlayerState::default();
    state.inventory.main.insert(0, ItemStack::new(item, 1));
    Snapshot::capture(player, "Steve", &Group::new(group), mode, state)
}

impl Harness {
    async fn joined(&self, world: &str, mode: GameMode) -> PlayerId {
        let player = self.server.connect(world, mode);
        self.coordinator.on_join(player);
        drain().await;
        player
    }
}

// ---------------------------------------------------------------------------
// Join / quit
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn global_bypass_on_join_touches_nothing() {
    let h = harness();
    let player = h.server.connect("world", GameMode::Survival);
    h.server.grant(player, "wardrobe.bypass");

    h.coordinator.on_join(player);
    drain().await;

    assert_eq!(h.store.call_count(), 0);
    assert_eq!(h.coordinator.current_group(player), None);
}

#[tokio::test(start_paused = true)]
async fn runtime_bypass_for_group_skips_join() {
    let h = harness();
    let player = h.server.connect("world", GameMode::Survival);
    h.coordinator.bypass().add_bypass(player, Some(&GroupName::from("survival")));

    h.coordinator.on_join(player);
    drain().await;

    assert_eq!(h.store.call_count(), 0);
    assert_eq!(h.coordinator.active_workers(), 0);
}

#[tokio::test(start_paused = true)]
async fn join_applies_stored_snapshot_and_tracks() {
    let h = harness();
    let player = h.server.connect("world", GameMode::Survival);
    h.store.seed(stored_with(player, "survival", None, "diamond_sword"));

    h.coordinator.on_join(player);
    drain().await;

    assert_eq!(h.server.holding(player), vec!["diamond_sword"]);
    assert_eq!(h.coordinator.current_group(player), Some(GroupName::from("survival")));
    let active = h.coordinator.active_snapshot(player).expect("active snapshot");
    assert_eq!(active.group.as_str(), "survival");
}

#[tokio::test(start_paused = true)]
async fn join_without_stored_snapshot_keeps_live_state() {
    let h = harness();
    let player = h.server.connect("world", GameMode::Survival);
    h.server.give(player, "bread");

    h.coordinator.on_join(player);
    drain().await;

    assert_eq!(h.server.holding(player), vec!["bread"]);
    assert_eq!(h.store.ops(), vec![StoreOp::Load(key(player, "survival", None))]);
    assert!(h.coordinator.active_snapshot(player).is_none());
}

#[tokio::test(start_paused = true)]
async fn quit_persists_untracks_and_retires_worker() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;
    h.server.give(player, "torch");

    h.coordinator.on_quit(player);
    h.server.disconnect(player);
    drain().await;

    let saved = h.store.get(&key(player, "survival", None)).expect("saved on quit");
    assert_eq!(saved.inventory.main.len(), 1);
    assert_eq!(h.coordinator.current_group(player), None);
    assert_eq!(h.coordinator.active_workers(), 0);
}

#[tokio::test(start_paused = true)]
async fn quit_untracks_even_when_the_store_fails() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;
    h.server.give(player, "torch");
    h.store.set_failing(true);

    h.coordinator.on_quit(player);
    h.server.disconnect(player);
    drain().await;

    assert!(h.store.get(&key(player, "survival", None)).is_none());
    assert_eq!(h.coordinator.current_group(player), None);
    assert!(h.coordinator.tracked_players().is_empty());
    assert_eq!(h.coordinator.active_workers(), 0);
}

/// Poll in real time; used where a worker blocks an OS thread.
async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quit_during_switch_apply_keeps_each_group_its_own_items() {
    let h = harness_with(MemorySnapshotStore::new(), without_delay());
    let player = h.server.connect("world", GameMode::Survival);
    h.coordinator.on_join(player);
    wait_until(|| h.coordinator.current_group(player).is_some()).await;
    h.server.give(player, "diamond_sword");
    h.store.seed(stored_with(player, "creative", Some(GameMode::Survival), "bedrock"));

    let (entered, release) = h.server.gate_next_apply();
    h.server.move_to(player, "creative");
    h.coordinator.on_world_change(player, "world", "creative");
    tokio::task::spawn_blocking(move || entered.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .expect("switch reached apply");

    // The worker is parked between applying creative contents and tracking
    // the creative group.
    let coordinator = h.coordinator.clone();
    let quitter = std::thread::spawn(move || coordinator.on_quit(player));
    tokio::time::sleep(Duration::from_millis(50)).await;
    release.send(()).unwrap();
    quitter.join().unwrap();
    wait_until(|| h.coordinator.active_workers() == 0).await;

    let survival = h.store.get(&key(player, "survival", None)).expect("saved by switch");
    assert_eq!(items(&survival), vec!["diamond_sword"]);
    let creative = h
        .store
        .get(&key(player, "creative", Some(GameMode::Survival)))
        .expect("saved on quit");
    assert_eq!(items(&creative), vec!["bedrock"]);
    assert_eq!(h.coordinator.current_group(player), None);
}

// ---------------------------------------------------------------------------
// World changes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn moving_between_groups_saves_then_loads_and_retracks() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;
    h.server.give(player, "diamond_sword");

    h.server.move_to(player, "creative");
    h.coordinator.on_world_change(player, "world", "creative");
    drain().await;

    assert_eq!(
        h.store.ops(),
        vec![
            StoreOp::Load(key(player, "survival", None)),
            StoreOp::Save(key(player, "survival", None)),
            StoreOp::Load(key(player, "creative", Some(GameMode::Survival))),
        ]
    );
    // Nothing stored for creative: the live inventory is cleared.
    assert!(h.server.holding(player).is_empty());
    assert_eq!(h.coordinator.current_group(player), Some(GroupName::from("creative")));

    let messages = h.server.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, "inventory.switched");
    assert_eq!(messages[0].2, vec!["survival", "creative"]);
    assert!(h.server.sounds.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn moving_back_restores_the_earlier_inventory() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;
    h.server.give(player, "diamond_sword");

    h.server.move_to(player, "creative");
    h.coordinator.on_world_change(player, "world", "creative");
    drain().await;
    h.server.give(player, "command_block");

    h.server.move_to(player, "world");
    h.coordinator.on_world_change(player, "creative", "world");
    drain().await;

    assert_eq!(h.server.holding(player), vec!["diamond_sword"]);
    let creative = h
        .store
        .get(&key(player, "creative", Some(GameMode::Survival)))
        .expect("creative saved");
    assert_eq!(creative.inventory.main.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn same_group_move_only_resaves() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;

    h.server.move_to(player, "world_nether");
    h.coordinator.on_world_change(player, "world", "world_nether");
    drain().await;

    assert_eq!(
        h.store.ops(),
        vec![
            StoreOp::Load(key(player, "survival", None)),
            StoreOp::Save(key(player, "survival", None)),
        ]
    );
    assert!(h.server.messages().is_empty());
    assert!(h.coordinator.active_snapshot(player).is_some());
}

#[tokio::test(start_paused = true)]
async fn disabled_world_change_feature_ignores_moves() {
    let mut settings = Settings::default();
    settings.features.save_on_world_change = false;
    let h = harness_with(MemorySnapshotStore::new(), settings);
    let player = h.joined("world", GameMode::Survival).await;

    h.server.move_to(player, "creative");
    h.coordinator.on_world_change(player, "world", "creative");
    drain().await;

    assert_eq!(h.store.call_count(), 1);
    assert_eq!(h.coordinator.current_group(player), Some(GroupName::from("survival")));
}

#[tokio::test(start_paused = true)]
async fn rapid_moves_within_delay_coalesce_to_live_world() {
    let mut settings = Settings::default();
    settings.performance.save_delay_ticks = 4;
    let h = harness_with(MemorySnapshotStore::new(), settings);
    let player = h.joined("world", GameMode::Survival).await;

    h.server.move_to(player, "creative");
    h.coordinator.on_world_change(player, "world", "creative");
    h.server.move_to(player, "world");
    h.coordinator.on_world_change(player, "creative", "world");
    drain().await;

    // Both jobs see the player back in `world`; no switch happens.
    assert_eq!(h.coordinator.current_group(player), Some(GroupName::from("survival")));
    assert!(h.server.messages().is_empty());
    assert!(!h
        .store
        .ops()
        .contains(&StoreOp::Load(key(player, "creative", Some(GameMode::Survival)))));
}

#[tokio::test(start_paused = true)]
async fn quit_during_delayed_move_saves_under_tracked_group() {
    let mut settings = Settings::default();
    settings.performance.save_delay_ticks = 20;
    let h = harness_with(MemorySnapshotStore::new(), settings);
    let player = h.joined("world", GameMode::Survival).await;
    h.server.give(player, "map");

    h.server.move_to(player, "creative");
    h.coordinator.on_world_change(player, "world", "creative");
    h.coordinator.on_quit(player);
    h.server.disconnect(player);
    drain().await;

    let saved = h.store.get(&key(player, "survival", None)).expect("saved under survival");
    assert_eq!(saved.inventory.main.len(), 1);
    assert!(h.store.get(&key(player, "creative", Some(GameMode::Survival))).is_none());
    assert_eq!(h.coordinator.current_group(player), None);
}

#[tokio::test(start_paused = true)]
async fn player_leaving_during_store_latency_is_abandoned() {
    let h = harness_with(
        MemorySnapshotStore::with_latency(Duration::from_millis(200)),
        Settings::default(),
    );
    let player = h.server.connect("world", GameMode::Survival);
    h.store.seed(stored_with(player, "survival", None, "diamond_sword"));

    h.coordinator.on_join(player);
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.server.disconnect(player);
    drain().await;

    assert!(h.server.holding(player).is_empty());
    assert_eq!(h.coordinator.current_group(player), None);
}

#[tokio::test(start_paused = true)]
async fn store_failure_during_switch_leaves_live_state_untouched() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;
    h.server.give(player, "diamond_sword");
    h.store.set_failing(true);

    h.server.move_to(player, "creative");
    h.coordinator.on_world_change(player, "world", "creative");
    drain().await;

    assert_eq!(h.server.holding(player), vec!["diamond_sword"]);
    assert_eq!(h.coordinator.current_group(player), Some(GroupName::from("survival")));
    assert!(h.server.cleared.lock().unwrap().is_empty());
}

/// Memory store whose loads panic for one group.
struct PanicOnLoad {
    inner: MemorySnapshotStore,
    group: &'static str,
}

#[async_trait]
impl SnapshotStore for PanicOnLoad {
    async fn load(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, StoreError> {
        if key.group.as_str() == self.group {
            panic!("backend exploded loading {}", key.group);
        }
        self.inner.load(key).await
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<bool, StoreError> {
        self.inner.save(snapshot).await
    }

    async fn delete(&self, key: &SnapshotKey) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_store_keeps_draining_the_queue() {
    let store = Arc::new(PanicOnLoad { inner: MemorySnapshotStore::new(), group: "creative" });
    let server = Arc::new(FakeServer::default());
    let coordinator = coordinator_over(store.clone(), server.clone(), without_delay());
    let player = server.connect("world", GameMode::Survival);
    coordinator.on_join(player);
    drain().await;
    server.give(player, "diamond_sword");

    server.move_to(player, "creative");
    coordinator.on_world_change(player, "world", "creative");
    coordinator.on_quit(player);
    drain().await;

    assert_eq!(coordinator.current_group(player), None);
    assert!(coordinator.tracked_players().is_empty());
    assert_eq!(coordinator.active_workers(), 0);
    let saved = store.inner.get(&key(player, "survival", None)).expect("saved");
    assert_eq!(items(&saved), vec!["diamond_sword"]);
    assert_eq!(server.holding(player), vec!["diamond_sword"]);
}

#[tokio::test(start_paused = true)]
async fn panicking_store_surfaces_as_store_error() {
    let store = Arc::new(PanicOnLoad { inner: MemorySnapshotStore::new(), group: "creative" });
    let server = Arc::new(FakeServer::default());
    let coordinator = coordinator_over(store, server.clone(), without_delay());
    let player = server.connect("world", GameMode::Survival);
    coordinator.on_join(player);
    drain().await;

    let result = coordinator
        .load_inventory(player, "creative".into(), LoadReason::Api)
        .await;

    assert!(matches!(
        result,
        Err(SwitchError::Store { operation: "load", source: StoreError::Panicked(_), .. })
    ));
    assert_eq!(coordinator.current_group(player), Some(GroupName::from("survival")));
}

#[tokio::test(start_paused = true)]
async fn configured_sound_plays_on_switch() {
    let mut settings = Settings::default();
    settings.global.switch_sound = Some("entity.enderman.teleport".to_string());
    settings.global.notify_on_switch = false;
    let h = harness_with(MemorySnapshotStore::new(), settings);
    let player = h.joined("world", GameMode::Survival).await;

    h.server.move_to(player, "creative");
    h.coordinator.on_world_change(player, "world", "creative");
    drain().await;

    assert!(h.server.messages().is_empty());
    assert_eq!(
        *h.server.sounds.lock().unwrap(),
        vec![(player, "entity.enderman.teleport".to_string())]
    );
}

// ---------------------------------------------------------------------------
// Game mode changes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn game_mode_change_swaps_inventories_in_separating_group() {
    let h = harness();
    let player = h.joined("creative", GameMode::Survival).await;
    h.server.give(player, "wooden_pickaxe");

    h.server.set_mode(player, GameMode::Creative);
    h.coordinator.on_game_mode_change(player, GameMode::Survival, GameMode::Creative);
    drain().await;

    assert!(h.server.holding(player).is_empty());
    assert!(h.store.get(&key(player, "creative", Some(GameMode::Survival))).is_some());
    let tracked = h.coordinator.tracked(player).expect("tracked");
    assert_eq!(tracked.game_mode, Some(GameMode::Creative));

    h.server.set_mode(player, GameMode::Survival);
    h.coordinator.on_game_mode_change(player, GameMode::Creative, GameMode::Survival);
    drain().await;

    assert_eq!(h.server.holding(player), vec!["wooden_pickaxe"]);
}

#[tokio::test(start_paused = true)]
async fn game_mode_change_is_ignored_without_separation() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;

    h.server.set_mode(player, GameMode::Creative);
    h.coordinator.on_game_mode_change(player, GameMode::Survival, GameMode::Creative);
    drain().await;

    assert_eq!(h.store.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn toggling_back_within_delay_does_nothing() {
    let h = harness();
    let player = h.joined("creative", GameMode::Survival).await;

    h.server.set_mode(player, GameMode::Creative);
    h.coordinator.on_game_mode_change(player, GameMode::Survival, GameMode::Creative);
    h.server.set_mode(player, GameMode::Survival);
    h.coordinator.on_game_mode_change(player, GameMode::Creative, GameMode::Survival);
    drain().await;

    assert_eq!(h.store.call_count(), 1);
    assert_eq!(h.coordinator.tracked(player).unwrap().game_mode, Some(GameMode::Survival));
}

// ---------------------------------------------------------------------------
// Death
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn death_in_clearing_group_wipes_stored_and_live_inventory() {
    let h = harness();
    let player = h.server.connect("world", GameMode::Survival);
    h.store.seed(stored_with(player, "survival", None, "totem"));
    h.coordinator.on_join(player);
    drain().await;

    h.coordinator.on_death(player);
    drain().await;

    assert!(h.store.get(&key(player, "survival", None)).is_none());
    assert!(h.server.holding(player).is_empty());
    assert!(h.coordinator.active_snapshot(player).is_none());
}

// ---------------------------------------------------------------------------
// Manual API and listeners
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn switch_to_same_group_makes_no_store_calls() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;
    let before = h.store.call_count();

    let outcome = assert_ok!(
        h.coordinator
            .switch_inventory(player, "survival".into(), "survival".into())
            .await
    );

    assert_eq!(outcome, Outcome::Unchanged);
    assert_eq!(h.store.call_count(), before);
}

struct CancelSwitch;

impl InventoryListener for CancelSwitch {
    fn on_switch(&self, event: &mut SwitchEvent) {
        event.set_cancelled(true);
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_switch_makes_no_store_calls() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;
    h.coordinator.register_listener(Arc::new(CancelSwitch));
    let before = h.store.call_count();

    let outcome = assert_ok!(
        h.coordinator
            .switch_inventory(player, "survival".into(), "creative".into())
            .await
    );

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(h.store.call_count(), before);
    assert_eq!(h.coordinator.current_group(player), Some(GroupName::from("survival")));
}

struct OverrideSwitch(Snapshot);

impl InventoryListener for OverrideSwitch {
    fn priority(&self) -> ListenerPriority {
        ListenerPriority::High
    }

    fn on_switch(&self, event: &mut SwitchEvent) {
        event.override_snapshot = Some(self.0.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn override_snapshot_replaces_target_load() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;
    let kit = stored_with(player, "creative", Some(GameMode::Survival), "starter_kit");
    h.coordinator.register_listener(Arc::new(OverrideSwitch(kit)));

    let outcome = assert_ok!(
        h.coordinator
            .switch_inventory(player, "survival".into(), "creative".into())
            .await
    );

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(h.server.holding(player), vec!["starter_kit"]);
    assert!(!h
        .store
        .ops()
        .contains(&StoreOp::Load(key(player, "creative", Some(GameMode::Survival)))));
}

struct CancelSaves;

impl InventoryListener for CancelSaves {
    fn on_save(&self, event: &mut SaveEvent<'_>) {
        event.set_cancelled(true);
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_save_skips_the_store() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;
    h.coordinator.register_listener(Arc::new(CancelSaves));

    let outcome = assert_ok!(h.coordinator.save_inventory(player, None).await);

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(h.store.call_count(), 1);
}

#[derive(Default)]
struct LoadRecorder(Mutex<Vec<LoadReason>>);

impl InventoryListener for LoadRecorder {
    fn priority(&self) -> ListenerPriority {
        ListenerPriority::Monitor
    }

    fn on_load(&self, event: &mut LoadEvent) {
        self.0.lock().unwrap().push(event.reason);
    }
}

#[tokio::test(start_paused = true)]
async fn manual_load_fires_event_with_reason_and_tracks() {
    let h = harness();
    let recorder = Arc::new(LoadRecorder::default());
    h.coordinator.register_listener(recorder.clone());
    let player = h.joined("world", GameMode::Survival).await;
    h.store.seed(stored_with(player, "creative", Some(GameMode::Survival), "elytra"));

    let outcome = assert_ok!(
        h.coordinator
            .load_inventory(player, "creative".into(), LoadReason::Command)
            .await
    );

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(h.server.holding(player), vec!["elytra"]);
    assert_eq!(*recorder.0.lock().unwrap(), vec![LoadReason::Join, LoadReason::Command]);
    assert_eq!(h.coordinator.current_group(player), Some(GroupName::from("creative")));
}

struct CancelLoads;

impl InventoryListener for CancelLoads {
    fn on_load(&self, event: &mut LoadEvent) {
        event.set_cancelled(true);
    }
}

#[tokio::test(start_paused = true)]
async fn cancelled_join_load_leaves_player_untracked() {
    let h = harness();
    h.coordinator.register_listener(Arc::new(CancelLoads));
    let player = h.server.connect("world", GameMode::Survival);
    h.store.seed(stored_with(player, "survival", None, "diamond_sword"));

    h.coordinator.on_join(player);
    drain().await;

    assert_eq!(h.store.call_count(), 0);
    assert_eq!(h.coordinator.current_group(player), None);
    assert!(h.server.holding(player).is_empty());
    assert_eq!(h.coordinator.active_workers(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_manual_load_leaves_player_untracked() {
    let h = harness();
    h.coordinator.register_listener(Arc::new(CancelLoads));
    let player = h.server.connect("creative", GameMode::Creative);
    h.store.seed(stored_with(player, "creative", Some(GameMode::Creative), "elytra"));

    let outcome = assert_ok!(
        h.coordinator
            .load_inventory(player, "creative".into(), LoadReason::Api)
            .await
    );

    assert_eq!(outcome, Outcome::Cancelled);
    assert_eq!(h.store.call_count(), 0);
    assert_eq!(h.coordinator.current_group(player), None);
    assert!(h.server.holding(player).is_empty());
}

#[tokio::test(start_paused = true)]
async fn manual_operations_report_errors() {
    let h = harness();
    let player = h.joined("world", GameMode::Survival).await;

    let unknown = h
        .coordinator
        .switch_inventory(player, "survival".into(), "nope".into())
        .await;
    assert!(matches!(unknown, Err(SwitchError::UnknownGroup(_))));

    let stranger = h.server.connect("world", GameMode::Survival);
    let untracked = h.coordinator.save_inventory(stranger, None).await;
    assert!(matches!(untracked, Err(SwitchError::NotTracked(_))));

    h.store.set_failing(true);
    let failed = h.coordinator.save_inventory(player, None).await;
    assert!(matches!(failed, Err(SwitchError::Store { operation: "save", .. })));
}

#[tokio::test(start_paused = true)]
async fn delete_inventory_removes_snapshot_and_active_reference() {
    let h = harness();
    let player = h.server.connect("world", GameMode::Survival);
    h.store.seed(stored_with(player, "survival", None, "shield"));
    h.coordinator.on_join(player);
    drain().await;

    let deleted = assert_ok!(
        h.coordinator
            .delete_inventory(player, "survival".into(), None)
            .await
    );
    assert!(deleted);
    assert!(h.coordinator.active_snapshot(player).is_none());

    let again = assert_ok!(
        h.coordinator
            .delete_inventory(player, "survival".into(), None)
            .await
    );
    assert!(!again);
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn deleting_a_group_untracks_its_players() {
    let h = harness();
    let player = h.joined("creative", GameMode::Survival).await;
    let other = h.joined("world", GameMode::Survival).await;

    assert_ok!(h.coordinator.groups().delete_group("creative"));
    assert_eq!(h.coordinator.forget_missing_groups(), 1);

    assert_eq!(h.coordinator.current_group(player), None);
    assert_eq!(h.coordinator.current_group(other), Some(GroupName::from("survival")));
    assert_eq!(h.coordinator.tracked_players().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_saves_every_tracked_player() {
    let h = harness();
    let a = h.joined("world", GameMode::Survival).await;
    let b = h.joined("creative", GameMode::Creative).await;

    assert_eq!(h.coordinator.shutdown().await, 2);
    drain().await;

    assert!(h.store.get(&key(a, "survival", None)).is_some());
    assert!(h.store.get(&key(b, "creative", Some(GameMode::Creative))).is_some());
    assert_eq!(h.coordinator.active_workers(), 0);
}
