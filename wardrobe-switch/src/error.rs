use thiserror::Error;

use wardrobe_core::{GroupName, PlayerId};

/// Failure reported by a [`SnapshotStore`](crate::ports::SnapshotStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(String),

    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    /// The backend panicked; the payload message when it was a string.
    #[error("store backend panicked: {0}")]
    Panicked(String),
}

/// Error surface of the switching coordinator and the config watcher.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("store error during {operation} for player {player} in group '{group}': {source}")]
    Store {
        player: PlayerId,
        group: GroupName,
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("player {0} is offline")]
    Offline(PlayerId),

    #[error("player {0} is not tracked")]
    NotTracked(PlayerId),

    #[error("unknown group '{0}'")]
    UnknownGroup(GroupName),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] wardrobe_core::ConfigError),

    #[error("group error: {0}")]
    Group(#[from] wardrobe_core::GroupError),
}

pub(crate) fn store_err(
    player: PlayerId,
    group: &GroupName,
    operation: &'static str,
    source: StoreError,
) -> SwitchError {
    SwitchError::Store {
        player,
        group: group.clone(),
        operation,
        source,
    }
}
