//! Backends file watcher for hot reload.
//!
//! Polls the modification time of the backends file and swaps the
//! balancer's backend set when it changes. A file that fails to load keeps
//! the current set.

use super::error::ConfigResult;
use super::loader::ConfigLoader;
use crate::modules::load_balancer::LoadBalancer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Floor for the polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Watches a backends file and reloads the balancer on change.
#[derive(Debug)]
pub struct BackendsWatcher {
    /// Path to the backends file.
    path: PathBuf,
    /// Polling interval.
    poll_interval: Duration,
    /// Balancer to update.
    balancer: Arc<LoadBalancer>,
    /// Configuration loader.
    loader: ConfigLoader,
    /// Modification time of the last applied file.
    last_modified: Option<SystemTime>,
}

impl BackendsWatcher {
    /// Create a watcher. The file's current state counts as already applied.
    ///
    /// `poll_interval` is raised to [`MIN_POLL_INTERVAL`] if shorter.
    pub fn new<P: AsRef<Path>>(path: P, poll_interval: Duration, balancer: Arc<LoadBalancer>) -> Self {
        let path = path.as_ref().to_path_buf();
        let last_modified = modified_time(&path);
        Self {
            path,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            balancer,
            loader: ConfigLoader::new(),
            last_modified,
        }
    }

    /// Reload the backends file now.
    ///
    /// Returns the new backend count.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded; the backend set is left
    /// untouched.
    pub fn reload(&mut self) -> ConfigResult<usize> {
        let modified = modified_time(&self.path);
        let file = self.loader.load_backends_file(&self.path)?;
        let count = self
            .balancer
            .replace_backends(file.backends.iter().map(|entry| entry.url.as_str()));
        self.last_modified = modified;
        Ok(count)
    }

    /// Reload if the file changed since the last applied version.
    ///
    /// Returns `Ok(None)` when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the changed file cannot be loaded.
    pub fn poll(&mut self) -> ConfigResult<Option<usize>> {
        let Some(mtime) = modified_time(&self.path) else {
            return Ok(None);
        };

        if self.last_modified.is_some_and(|old| mtime <= old) {
            return Ok(None);
        }

        self.reload().map(Some)
    }

    /// Start polling until `shutdown` flips.
    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            info!(path = %self.path.display(), "Watching backends file");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.poll() {
                            Ok(Some(count)) => info!(count, "Reloaded backends file"),
                            Ok(None) => debug!("Backends file unchanged"),
                            Err(e) => {
                                // Keep retrying the same version until it parses.
                                warn!(error = %e, "Failed to reload backends file");
                            },
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Stopping backends file watcher");
                        break;
                    }
                }
            }
        })
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
