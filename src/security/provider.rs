//! Supplying the current verification key to the pipeline.
//!
//! By default the key file is read and parsed on every request, so a replaced
//! key takes effect immediately. [`WatchedKeyProvider`] keeps the parsed key
//! in memory and drops it whenever the file changes on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use rsa::RsaPublicKey;

use crate::config::{KeyConfig, KeyReloadPolicy};
use crate::security::keys::{load_public_key, KeyError};

/// Source of the key signatures are checked against.
pub trait KeyProvider: Send + Sync {
    fn current_key(&self) -> Result<Arc<RsaPublicKey>, KeyError>;
}

/// Re-reads the key file on every call.
#[derive(Debug, Clone)]
pub struct ReloadingKeyProvider {
    path: PathBuf,
}

impl ReloadingKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl KeyProvider for ReloadingKeyProvider {
    fn current_key(&self) -> Result<Arc<RsaPublicKey>, KeyError> {
        load_public_key(&self.path).map(Arc::new)
    }
}

/// A parsed key and the invalidation generation it was loaded under.
struct CachedKey {
    generation: u64,
    key: Arc<RsaPublicKey>,
}

/// Memoizes the parsed key until the file changes.
///
/// A failed load is never cached; the next request tries again. Every
/// invalidation bumps a generation counter, and a cached key is only served
/// while its generation is current, so a load that raced with a file change
/// cannot outlive it.
pub struct WatchedKeyProvider {
    path: PathBuf,
    generation: Arc<AtomicU64>,
    slot: Arc<ArcSwapOption<CachedKey>>,
    _watcher: Option<Mutex<RecommendedWatcher>>,
}

impl WatchedKeyProvider {
    /// Provider without a filesystem watcher; only [`invalidate`](Self::invalidate)
    /// clears the cached key.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            generation: Arc::new(AtomicU64::new(0)),
            slot: Arc::new(ArcSwapOption::empty()),
            _watcher: None,
        }
    }

    /// Provider that invalidates itself when the key file is modified,
    /// replaced or removed.
    ///
    /// The parent directory is watched rather than the file so that
    /// rename-over-style rotations are seen too.
    pub fn watch(path: impl Into<PathBuf>) -> Result<Self, notify::Error> {
        let mut provider = Self::new(path);
        let generation = provider.generation.clone();
        let slot = provider.slot.clone();
        let file_name = provider.path.file_name().map(|n| n.to_os_string());
        let dir = match provider.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_key = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_key && !event.kind.is_access() {
                        tracing::info!(kind = ?event.kind, "Key file changed, dropping cached key");
                        generation.fetch_add(1, Ordering::AcqRel);
                        slot.store(None);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Key watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?provider.path, "Key watcher started");
        provider._watcher = Some(Mutex::new(watcher));
        Ok(provider)
    }

    /// Forget the cached key.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.slot.store(None);
    }

    fn remember(&self, generation: u64, key: Arc<RsaPublicKey>) {
        self.slot.store(Some(Arc::new(CachedKey { generation, key })));
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyProvider for WatchedKeyProvider {
    fn current_key(&self) -> Result<Arc<RsaPublicKey>, KeyError> {
        // Read before loading: an invalidation during the load makes the
        // stored entry stale at once.
        let generation = self.generation.load(Ordering::Acquire);
        if let Some(cached) = self.slot.load_full() {
            if cached.generation == generation {
                return Ok(cached.key.clone());
            }
        }
        let key = Arc::new(load_public_key(&self.path)?);
        self.remember(generation, key.clone());
        tracing::debug!(path = ?self.path, generation, "Verification key cached");
        Ok(key)
    }
}

/// Build the provider selected by `config.reload`.
pub fn key_provider_from_config(
    config: &KeyConfig,
) -> Result<Arc<dyn KeyProvider>, notify::Error> {
    Ok(match config.reload {
        KeyReloadPolicy::Always => Arc::new(ReloadingKeyProvider::new(&config.path)),
        KeyReloadPolicy::OnChange => Arc::new(WatchedKeyProvider::watch(&config.path)?),
    })
}
