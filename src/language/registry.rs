//! Shared, reference-counted language bindings.
//!
//! Any number of consumers can request the same language id; they share one
//! [`LanguageLoader`] and therefore one load and one store. The binding is
//! torn down when the last request is disposed.

use super::catalog::LanguageManager;
use super::loader::{LanguageLoader, LoadParams, LoadState};
use super::store::LanguageStore;
use crate::observable::{Change, Observable};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug)]
struct Record {
    count: usize,
    loader: Arc<LanguageLoader>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    records: Mutex<HashMap<String, Record>>,
    active_manager: Observable<Option<Arc<LanguageManager>>>,
    leaked: AtomicUsize,
}

impl RegistryInner {
    fn records(&self) -> MutexGuard<'_, HashMap<String, Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, language: &str) {
        let loader = {
            let mut records = self.records();
            let Some(record) = records.get_mut(language) else {
                return;
            };
            record.count -= 1;
            if record.count > 0 {
                return;
            }
            records.remove(language).map(|record| record.loader)
        };

        if let Some(loader) = loader {
            debug!("Last request for '{}' released, tearing down", language);
            loader.set_params(LoadParams::default());
        }
    }
}

/// Registry of shared bindings keyed by language id.
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct RequestRegistry {
    inner: Arc<RegistryInner>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `language`. Must be called inside a Tokio runtime.
    pub fn create_request(&self, language: impl Into<String>) -> LanguageRequest {
        let language = language.into();

        let loader = {
            let mut records = self.inner.records();
            let record = records.entry(language.clone()).or_insert_with(|| {
                debug!("Creating binding for '{}'", language);
                Record {
                    count: 0,
                    loader: Arc::new(LanguageLoader::new()),
                }
            });
            record.count += 1;
            if record.count == 1 {
                if let Some(manager) = self.inner.active_manager.get() {
                    record
                        .loader
                        .set_params(LoadParams::new(manager, language.clone()));
                }
            }
            Arc::clone(&record.loader)
        };

        LanguageRequest {
            language,
            loader: Some(loader),
            registry: Arc::clone(&self.inner),
        }
    }

    /// Point every binding, existing and future, at `manager`.
    pub fn set_active_manager(&self, manager: Option<Arc<LanguageManager>>) {
        self.inner.active_manager.set(manager.clone());

        let records = self.inner.records();
        for (language, record) in records.iter() {
            let params = match &manager {
                Some(manager) => LoadParams::new(Arc::clone(manager), language.clone()),
                None => LoadParams::default(),
            };
            record.loader.set_params(params);
        }
    }

    /// Manager new requests are bound to.
    pub fn active_manager(&self) -> Option<Arc<LanguageManager>> {
        self.inner.active_manager.get()
    }

    /// Live requests for `language`.
    pub fn active_requests(&self, language: &str) -> usize {
        self.inner
            .records()
            .get(language)
            .map(|record| record.count)
            .unwrap_or(0)
    }

    /// Languages with at least one live request.
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.inner.records().keys().cloned().collect();
        languages.sort();
        languages
    }

    /// Requests that were dropped without [`LanguageRequest::dispose`].
    pub fn leaked_requests(&self) -> usize {
        self.inner.leaked.load(Ordering::Relaxed)
    }
}

/// A consumer's handle on a shared binding.
///
/// Call [`LanguageRequest::dispose`] when done. Dropping an undisposed
/// request still releases it but is counted as a leak.
#[derive(Debug)]
pub struct LanguageRequest {
    language: String,
    loader: Option<Arc<LanguageLoader>>,
    registry: Arc<RegistryInner>,
}

impl LanguageRequest {
    /// Language id this request was created for.
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_disposed(&self) -> bool {
        self.loader.is_none()
    }

    /// Current binding state; `Idle` once disposed.
    pub fn state(&self) -> LoadState {
        self.loader
            .as_ref()
            .map(|loader| loader.state())
            .unwrap_or_default()
    }

    /// Loaded store, `None` while loading, failed, or disposed.
    pub fn store(&self) -> Option<Arc<LanguageStore>> {
        self.loader.as_ref().and_then(|loader| loader.store())
    }

    /// Store-changed notifications. `None` once disposed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Change<LoadState>>> {
        self.loader.as_ref().map(|loader| loader.subscribe())
    }

    pub async fn settled(&self) -> LoadState {
        match &self.loader {
            Some(loader) => loader.settled().await,
            None => LoadState::Idle,
        }
    }

    /// Release this request. Calling it again does nothing.
    pub fn dispose(&mut self) {
        if self.loader.take().is_some() {
            self.registry.release(&self.language);
        }
    }
}

impl Drop for LanguageRequest {
    fn drop(&mut self) {
        if self.loader.is_some() {
            warn!(
                "Language request for '{}' dropped without dispose",
                self.language
            );
            self.registry.leaked.fetch_add(1, Ordering::Relaxed);
            self.dispose();
        }
    }
}
