//! Configuration file watcher for hot reload.
//!
//! # Responsibilities
//! - Notice edits of the gateway file, including atomic rename-over saves
//! - Collapse bursts of notify events into one reload
//! - Publish only configurations that parse, validate and differ from the
//!   last published one
//!
//! # Design Decisions
//! - The parent directory is watched, not the file: editors that replace the
//!   file would otherwise detach the watch
//! - A file that fails to load is logged and skipped; the running
//!   configuration stays in place

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::parse_config;
use crate::config::schema::ProxyConfig;

/// Quiet period after the last file event before the file is read.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Result of one reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new configuration was sent to the server.
    Published,
    /// The file content matches what was last published.
    Unchanged,
    /// The file could not be read, parsed or validated.
    Rejected,
}

/// Watches the configuration file and publishes validated replacements.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    last_published: Option<String>,
    updates: mpsc::UnboundedSender<ProxyConfig>,
}

/// Keeps the watch alive; dropping it stops reloads.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ConfigWatcher {
    /// Watch `path`, whose current content is treated as already applied.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (updates, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            debounce: DEFAULT_DEBOUNCE,
            last_published: fs::read_to_string(path).ok(),
            updates,
        };
        (watcher, update_rx)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a Tokio runtime.
    pub fn run(self) -> Result<WatchHandle, notify::Error> {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let file_name = self.path.file_name().map(|name| name.to_os_string());
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_)
                    ) && event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        let _ = change_tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(
            path = %self.path.display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "Config watcher started"
        );
        let task = tokio::spawn(self.settle(change_rx));
        Ok(WatchHandle {
            _watcher: watcher,
            task,
        })
    }

    /// Reload once per burst of change notifications.
    pub async fn settle(mut self, mut changes: mpsc::UnboundedReceiver<()>) {
        while changes.recv().await.is_some() {
            loop {
                match tokio::time::timeout(self.debounce, changes.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => {
                        self.reload();
                        return;
                    }
                    Err(_) => break,
                }
            }
            self.reload();
        }
    }

    /// Read the file and publish it if it is new and valid.
    pub fn reload(&mut self) -> ReloadOutcome {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Cannot read config file");
                return ReloadOutcome::Rejected;
            }
        };
        if self.last_published.as_deref() == Some(content.as_str()) {
            tracing::debug!(path = %self.path.display(), "Config file unchanged");
            return ReloadOutcome::Unchanged;
        }

        match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %self.path.display(), "Config file changed, publishing");
                self.last_published = Some(content);
                let _ = self.updates.send(config);
                ReloadOutcome::Published
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to reload config, keeping current configuration"
                );
                ReloadOutcome::Rejected
            }
        }
    }
}
