//! Hot reload of `groups.yaml` and `settings.yaml`.
//!
//! Watches `<home>/.wardrobe/` and reloads the matching file after a change.
//! Rapid writes to one file are debounced. A file that fails to parse or
//! compile is logged and the previous state is kept.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use wardrobe_core::config::{self, wardrobe_root};

use crate::coordinator::Coordinator;
use crate::error::SwitchError;

/// Events on the same file closer together than this are coalesced.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFile {
    Groups,
    Settings,
}

impl ConfigFile {
    /// Which config file `path` is, if any.
    pub fn classify(path: &Path) -> Option<Self> {
        match path.file_name().and_then(|name| name.to_str()) {
            Some("groups.yaml") => Some(ConfigFile::Groups),
            Some("settings.yaml") => Some(ConfigFile::Settings),
            _ => None,
        }
    }
}

/// Re-read one config file from `home` and push it into the coordinator.
///
/// For groups this swaps the catalog and then drops tracking for players whose
/// group disappeared.
pub fn reload_from_disk(
    coordinator: &Coordinator,
    home: &Path,
    file: ConfigFile,
) -> Result<(), SwitchError> {
    match file {
        ConfigFile::Groups => {
            let groups = config::load_groups_at(home)?;
            coordinator.groups().reload(&groups)?;
            let dropped = coordinator.forget_missing_groups();
            tracing::info!(groups = coordinator.groups().table().len(), dropped, "group catalog reloaded from disk");
        }
        ConfigFile::Settings => {
            let settings = config::load_settings_at(home)?;
            coordinator.reload_settings(settings);
        }
    }
    Ok(())
}

/// Run until `shutdown_rx` fires or the watcher channel closes.
pub async fn watch_config(
    home: PathBuf,
    coordinator: Coordinator,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), SwitchError> {
    let root = wardrobe_root(&home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(wardrobe_core::ConfigError::from)?;
    }
    // FSEvents reports real paths (/private/var/... on macOS).
    let root = fs::canonicalize(&root).unwrap_or(root);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&root, RecursiveMode::NonRecursive)?;
    tracing::info!(path = %root.display(), "watching config directory");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    let Some(file) = ConfigFile::classify(&path) else {
                        continue;
                    };
                    if !should_process_event(&mut debounce, &path, Instant::now(), DEBOUNCE_WINDOW) {
                        continue;
                    }
                    if let Err(err) = reload_from_disk(&coordinator, &home, file) {
                        tracing::error!(?file, error = %err, "config reload failed; keeping previous state");
                    }
                }
            }
        }
    }

    tracing::info!("config watcher stopped");
    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}
