//! Load coordinator: keeps one language loaded for a `(manager, id)` binding.
//!
//! Whenever the manager publishes a new catalog, or the binding's parameters
//! change, a fresh load attempt starts. Each attempt carries a generation
//! number; when it finishes it only publishes its result if no newer
//! attempt started in the meantime. Stale attempts are never aborted, their
//! results are simply dropped.

use super::catalog::{LanguageManager, SharedCatalog};
use super::header::LanguageHeader;
use super::store::{LanguageStore, StoreOptions};
use crate::error::LocalizationError;
use crate::observable::{Change, Observable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which language to load and from which manager.
#[derive(Debug, Clone, Default)]
pub struct LoadParams {
    pub manager: Option<Arc<LanguageManager>>,
    pub language: String,
}

impl LoadParams {
    pub fn new(manager: Arc<LanguageManager>, language: impl Into<String>) -> Self {
        Self {
            manager: Some(manager),
            language: language.into(),
        }
    }
}

impl PartialEq for LoadParams {
    fn eq(&self, other: &Self) -> bool {
        let same_manager = match (&self.manager, &other.manager) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_manager && self.language == other.language
    }
}

/// Observable state of a binding.
#[derive(Debug, Clone, Default)]
pub enum LoadState {
    /// No manager, no catalog yet, or the id is not in the catalog.
    #[default]
    Idle,
    Loading,
    Loaded(Arc<LanguageStore>),
    Failed(Arc<LocalizationError>),
}

impl LoadState {
    /// Loaded store, if this state has one.
    pub fn store(&self) -> Option<&Arc<LanguageStore>> {
        match self {
            LoadState::Loaded(store) => Some(store),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }
}

#[derive(Debug)]
struct LoaderShared {
    params: Mutex<LoadParams>,
    generation: AtomicU64,
    state: Observable<LoadState>,
}

impl LoaderShared {
    fn params(&self) -> MutexGuard<'_, LoadParams> {
        self.params.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What an attempt needs to run, or `None` when the binding has nothing to load.
fn resolve(
    params: LoadParams,
    catalog: SharedCatalog,
) -> Option<(Arc<LanguageManager>, Arc<LanguageHeader>, String)> {
    let manager = params.manager?;
    let catalog = catalog?;
    let Some(header) = catalog.get(&params.language).cloned() else {
        debug!("Language '{}' not in catalog", params.language);
        return None;
    };
    Some((manager, header, params.language))
}

/// Start a new attempt for `catalog`, superseding any in flight.
///
/// The generation bump, the params read and the `Loading`/`Idle` transition
/// happen under the state lock, as does the generation check before a result
/// is published. A stale attempt can therefore never land after a newer one.
fn on_catalog_changed(shared: &Arc<LoaderShared>, catalog: SharedCatalog) {
    let mut attempt = None;
    shared.state.update(|_| {
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let params = shared.params().clone();
        match resolve(params, catalog) {
            Some((manager, header, language)) => {
                attempt = Some((generation, manager, header, language));
                Some(LoadState::Loading)
            }
            None => Some(LoadState::Idle),
        }
    });

    let Some((generation, manager, header, language)) = attempt else {
        return;
    };
    info!("Loading language '{}'", language);

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let options = StoreOptions::from_config(manager.config());
        let result = LanguageStore::load(header, manager.fetcher(), options).await;

        let failure = result.as_ref().err().map(ToString::to_string);
        let next = match result {
            Ok(store) => LoadState::Loaded(Arc::new(store)),
            Err(e) => LoadState::Failed(Arc::new(e)),
        };

        let published = shared.state.update(|_| {
            (shared.generation.load(Ordering::SeqCst) == generation).then_some(next)
        });

        match (published, failure) {
            (None, _) => debug!("Discarding stale load of language '{}'", language),
            (Some(_), Some(e)) => warn!("Failed to load language '{}': {}", language, e),
            (Some(_), None) => debug!("Published language '{}'", language),
        }
    });
}

/// One binding between a language id and its loaded store.
#[derive(Debug)]
pub struct LanguageLoader {
    shared: Arc<LoaderShared>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl LanguageLoader {
    /// Unbound loader in `Idle`.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(LoaderShared {
                params: Mutex::new(LoadParams::default()),
                generation: AtomicU64::new(0),
                state: Observable::new(LoadState::Idle),
            }),
            watcher: Mutex::new(None),
        }
    }

    /// Current binding.
    pub fn params(&self) -> LoadParams {
        self.shared.params().clone()
    }

    /// Rebind to new parameters. Must be called inside a Tokio runtime.
    ///
    /// Equal parameters (same manager instance, same id) are a no-op.
    pub fn set_params(&self, params: LoadParams) {
        {
            let mut current = self.shared.params();
            if *current == params {
                return;
            }
            *current = params.clone();
        }

        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = watcher.take() {
            handle.abort();
        }

        let Some(manager) = params.manager else {
            on_catalog_changed(&self.shared, None);
            return;
        };

        let (catalog, mut changes) = manager.subscribe_with_current();
        on_catalog_changed(&self.shared, catalog);

        let shared = Arc::clone(&self.shared);
        *watcher = Some(tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => on_catalog_changed(&shared, change.new),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Catalog watcher lagged by {} changes", skipped);
                        on_catalog_changed(&shared, manager.headers());
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Current state of the binding.
    pub fn state(&self) -> LoadState {
        self.shared.state.get()
    }

    /// Currently loaded store, if any.
    pub fn store(&self) -> Option<Arc<LanguageStore>> {
        self.state().store().cloned()
    }

    /// Every state transition as `(new, old)`.
    pub fn subscribe(&self) -> broadcast::Receiver<Change<LoadState>> {
        self.shared.state.subscribe()
    }

    /// Wait until the binding leaves `Loading` and return that state.
    pub async fn settled(&self) -> LoadState {
        let (state, mut changes) = self.shared.state.subscribe_with_current();
        if !state.is_loading() {
            return state;
        }
        loop {
            match changes.recv().await {
                Ok(change) if !change.new.is_loading() => return change.new,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    let state = self.state();
                    if !state.is_loading() {
                        return state;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return self.state(),
            }
        }
    }
}

impl Default for LanguageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LanguageLoader {
    fn drop(&mut self) {
        let watcher = self.watcher.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = watcher.take() {
            handle.abort();
        }
        // any load still running must not publish
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }
}
