// src/physical/notify_backend.rs

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::debug;

use crate::errors::Result;
use crate::physical::events::{FsEvent, WatchBackend};

/// Watch backend over `notify`'s recommended platform watcher.
///
/// Created disabled; enabling it starts a recursive watch on the root.
/// The notify callback runs on notify's own thread and only forwards into
/// the channel, so event handling never blocks the OS watcher.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
    root: PathBuf,
    enabled: bool,
}

impl NotifyBackend {
    pub fn new(root: impl Into<PathBuf>) -> Result<(Self, UnboundedReceiver<FsEvent>)> {
        let root = root.into();
        let (tx, rx) = unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for translated in translate(event) {
                        // A closed channel just means the watcher is gone.
                        let _ = tx.send(translated);
                    }
                }
                Err(err) => {
                    let _ = tx.send(FsEvent::Error(err.to_string()));
                }
            },
            Config::default(),
        )?;

        Ok((
            Self {
                watcher,
                root,
                enabled: false,
            },
            rx,
        ))
    }
}

impl WatchBackend for NotifyBackend {
    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.enabled {
            return Ok(());
        }
        if enabled {
            self.watcher.watch(&self.root, RecursiveMode::Recursive)?;
            debug!(root = ?self.root, "notify backend enabled");
        } else {
            self.watcher.unwatch(&self.root)?;
            debug!(root = ?self.root, "notify backend disabled");
        }
        self.enabled = enabled;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

fn translate(event: Event) -> Vec<FsEvent> {
    match event.kind {
        // Reads never invalidate anything.
        EventKind::Access(_) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                return vec![FsEvent::Renamed {
                    from: from.clone(),
                    to: to.clone(),
                }];
            }
            event.paths.into_iter().map(FsEvent::Changed).collect()
        }
        _ => event.paths.into_iter().map(FsEvent::Changed).collect(),
    }
}
