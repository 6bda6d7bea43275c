//! Assembles a runnable operator from a config source, a platform client and
//! settings.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{ConfigSource, ConfigWatcher, DirectoryConfigSource};
use crate::controller::{ReconcileLoop, Reconciler, Trigger};
use crate::error::Result;
use crate::platform::PlatformClient;
use crate::settings::OperatorSettings;
use crate::status::StatusReporter;
use crate::tasks::TaskRegistry;

pub struct Operator {
    reconcile_loop: ReconcileLoop,
    watcher: Option<Arc<ConfigWatcher>>,
}

impl Operator {
    /// Builds an operator over the standard component tasks.
    pub fn new(
        source: Arc<dyn ConfigSource>,
        client: Arc<dyn PlatformClient>,
        settings: OperatorSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let registry = TaskRegistry::standard()?;
        log::info!("Component order: {}", registry.order().join(" -> "));

        let reconciler = Reconciler::new(source, client, registry, settings);
        Ok(Self {
            reconcile_loop: ReconcileLoop::new(reconciler),
            watcher: None,
        })
    }

    /// Builds an operator that reads its configuration from `config_dir` and
    /// reconciles whenever a file there changes.
    pub fn from_directory(
        config_dir: impl Into<PathBuf>,
        client: Arc<dyn PlatformClient>,
        settings: OperatorSettings,
    ) -> Result<Self> {
        let config_dir = config_dir.into();
        let source = Arc::new(DirectoryConfigSource::new(config_dir.clone()));
        let mut operator = Self::new(source, client, settings)?;

        let watcher = ConfigWatcher::new(config_dir, operator.reconcile_loop.trigger());
        operator.watcher = Some(Arc::new(watcher));
        Ok(operator)
    }

    pub fn status(&self) -> Arc<StatusReporter> {
        self.reconcile_loop.status()
    }

    pub fn trigger(&self) -> Trigger {
        self.reconcile_loop.trigger()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.reconcile_loop.cancel_token()
    }

    /// Runs until the cancel token fires. Returns the reconciler so callers
    /// can inspect the final state.
    pub async fn run(self) -> Result<Reconciler> {
        let watch_thread = self.watcher.as_ref().map(|w| Arc::clone(w).spawn());

        let reconciler = self.reconcile_loop.run().await;

        if let (Some(watcher), Some(handle)) = (self.watcher, watch_thread) {
            watcher.stop();
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(result)) => result?,
                Ok(Err(_)) => log::error!("Config watcher thread panicked"),
                Err(e) => log::error!("Failed to join config watcher: {}", e),
            }
        }

        Ok(reconciler)
    }
}
