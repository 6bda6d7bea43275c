//! Where raw configuration documents come from.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::error::{ConfigError, Result};

/// File name of the base document inside a config directory.
pub const BASE_CONFIG_FILE: &str = "config.yaml";

/// Path of the overlay document relative to a config directory.
pub const OVERLAY_CONFIG_FILE: &str = "user-workload/config.yaml";

/// An unparsed configuration document and the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfig {
    pub content: String,
    pub revision: String,
}

impl RawConfig {
    pub fn new(content: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            revision: revision.into(),
        }
    }
}

/// Both documents as fetched together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub base: RawConfig,
    pub overlay: Option<RawConfig>,
}

/// Supplies the current configuration documents to the reconcile loop.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> Result<ConfigSnapshot>;
}

/// Configuration held in memory. Every update bumps the revision.
#[derive(Debug)]
pub struct InMemoryConfigSource {
    base: RwLock<String>,
    overlay: RwLock<Option<String>>,
    revision: AtomicU64,
}

impl InMemoryConfigSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: RwLock::new(base.into()),
            overlay: RwLock::new(None),
            revision: AtomicU64::new(1),
        }
    }

    /// Replaces the base document.
    pub fn set_base(&self, content: impl Into<String>) {
        match self.base.write() {
            Ok(mut guard) => *guard = content.into(),
            Err(poisoned) => {
                log::warn!("Base config lock was poisoned, recovering");
                *poisoned.into_inner() = content.into();
            }
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    /// Replaces (or removes) the overlay document.
    pub fn set_overlay(&self, content: Option<String>) {
        match self.overlay.write() {
            Ok(mut guard) => *guard = content,
            Err(poisoned) => {
                log::warn!("Overlay config lock was poisoned, recovering");
                *poisoned.into_inner() = content;
            }
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> ConfigSnapshot {
        let revision = self.revision.load(Ordering::SeqCst).to_string();
        let base = match self.base.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let overlay = match self.overlay.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        ConfigSnapshot {
            base: RawConfig::new(base, revision.clone()),
            overlay: overlay.map(|content| RawConfig::new(content, revision)),
        }
    }
}

#[async_trait]
impl ConfigSource for InMemoryConfigSource {
    async fn fetch(&self) -> Result<ConfigSnapshot> {
        Ok(self.snapshot())
    }
}

/// Reads both documents from a directory on disk.
///
/// A missing base file is treated as an empty document; a missing overlay
/// file means there is no overlay. Revisions are content hashes, so
/// touching a file without changing it does not change the revision.
#[derive(Debug, Clone)]
pub struct DirectoryConfigSource {
    root: PathBuf,
}

impl DirectoryConfigSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_optional(&self, relative: &str) -> Result<Option<RawConfig>> {
        let path = self.root.join(relative);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let revision = content_revision(&content);
                Ok(Some(RawConfig::new(content, revision)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::ReadFile { path, source }),
        }
    }
}

#[async_trait]
impl ConfigSource for DirectoryConfigSource {
    async fn fetch(&self) -> Result<ConfigSnapshot> {
        let base = self
            .read_optional(BASE_CONFIG_FILE)
            .await?
            .unwrap_or_else(|| RawConfig::new("", content_revision("")));
        let overlay = self.read_optional(OVERLAY_CONFIG_FILE).await?;
        Ok(ConfigSnapshot { base, overlay })
    }
}

/// Short hex digest of a document's content.
pub fn content_revision(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}
