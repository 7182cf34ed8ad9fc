//! Per-world inventory switching on top of the wardrobe group catalog.

mod coordinator;
mod error;
pub mod events;
mod handlers;
pub mod memory;
pub mod ports;
pub mod watch;

pub use coordinator::{Coordinator, Outcome, Tracked, BYPASS_PERMISSION, TICK};
pub use error::{StoreError, SwitchError};
pub use events::{
    EventBus, InventoryListener, ListenerPriority, LoadEvent, LoadReason, SaveEvent, SwitchCause,
    SwitchEvent,
};
pub use memory::{MemorySnapshotStore, StoreOp};
pub use ports::{LivePlayers, Notifier, Permissions, Ports, SnapshotStore};
pub use watch::{reload_from_disk, watch_config, ConfigFile};

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Hosts that already install a subscriber can skip this; a second call is a
/// no-op.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Like [`init_tracing`], but emits one JSON object per line.
pub fn init_json_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().json().with_env_filter(filter).try_init();
}
