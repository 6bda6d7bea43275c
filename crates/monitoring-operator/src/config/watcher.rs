//! File system watcher that turns config directory changes into reconcile
//! triggers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};

use super::error::{ConfigError, Result};
use crate::controller::Trigger;

const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Watches a config directory and fires a [`Trigger`] when a YAML document
/// in it changes.
pub struct ConfigWatcher {
    config_dir: PathBuf,
    trigger: Trigger,
    shutdown: Arc<AtomicBool>,
}

impl ConfigWatcher {
    pub fn new(config_dir: impl Into<PathBuf>, trigger: Trigger) -> Self {
        Self {
            config_dir: config_dir.into(),
            trigger,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Starts watching the config directory.
    ///
    /// Blocks until [`stop`](Self::stop) is called.
    pub fn watch(&self) -> Result<()> {
        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer: Debouncer<RecommendedWatcher> = new_debouncer(DEBOUNCE_DELAY, tx)
            .map_err(|e| ConfigError::WatchError(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.config_dir, RecursiveMode::Recursive)
            .map_err(|e| ConfigError::WatchError(e.to_string()))?;

        log::info!(
            "Started watching config directory: {}",
            self.config_dir.display()
        );

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match rx.recv_timeout(SHUTDOWN_POLL) {
                Ok(Ok(events)) => {
                    let changed: Vec<String> = events
                        .into_iter()
                        .filter_map(|event| self.relevant_path(&event))
                        .collect();
                    if !changed.is_empty() {
                        log::info!("Configuration changed: {}", changed.join(", "));
                        self.trigger.fire();
                    }
                }
                Ok(Err(e)) => {
                    log::error!("Watch error: {}", e);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        log::info!("Stopped watching config directory");
        Ok(())
    }

    /// Runs [`watch`](Self::watch) on a background thread.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<Result<()>> {
        std::thread::spawn(move || self.watch())
    }

    /// Returns the config-relative path of a YAML document touched by
    /// `event`, or `None` for anything else.
    fn relevant_path(&self, event: &DebouncedEvent) -> Option<String> {
        let path = &event.path;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if ext != "yaml" && ext != "yml" {
            return None;
        }

        let relative = path.strip_prefix(&self.config_dir).ok()?;
        Some(relative.to_string_lossy().to_string())
    }

    /// Signals the watcher to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_debouncer_mini::DebouncedEventKind;
    use tempfile::TempDir;

    fn event(path: PathBuf) -> DebouncedEvent {
        DebouncedEvent {
            path,
            kind: DebouncedEventKind::Any,
        }
    }

    #[test]
    fn test_relevant_path_yaml_only() {
        let dir = TempDir::new().unwrap();
        let watcher = ConfigWatcher::new(dir.path(), Trigger::new());

        assert_eq!(
            watcher.relevant_path(&event(dir.path().join("user-workload/config.yaml"))),
            Some(format!("user-workload{}config.yaml", std::path::MAIN_SEPARATOR))
        );
        assert_eq!(watcher.relevant_path(&event(dir.path().join("notes.txt"))), None);
    }

    #[test]
    fn test_relevant_path_outside_dir() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let watcher = ConfigWatcher::new(dir.path(), Trigger::new());

        assert_eq!(
            watcher.relevant_path(&event(other.path().join("config.yaml"))),
            None
        );
    }

    #[test]
    fn test_watcher_stop() {
        let dir = TempDir::new().unwrap();
        let watcher = Arc::new(ConfigWatcher::new(dir.path(), Trigger::new()));
        assert!(!watcher.is_stopped());

        let handle = Arc::clone(&watcher).spawn();
        std::thread::sleep(Duration::from_millis(50));
        watcher.stop();

        assert!(handle.join().expect("watcher thread panicked").is_ok());
        assert!(watcher.is_stopped());
    }
}
