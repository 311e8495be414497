//! Key-based lookups against whichever store is currently loaded.

use super::store::LanguageStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shown when no language is loaded at all.
pub const NO_LANGUAGE: &str = "NO LANGUAGE";

/// A text key that resolves against an optional store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedString {
    key: String,
}

impl LocalizedString {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The localized text, the key itself if the store lacks it, or
    /// [`NO_LANGUAGE`] without a store.
    pub fn resolve(&self, store: Option<&Arc<LanguageStore>>) -> String {
        match store {
            Some(store) => store.localize(&self.key),
            None => NO_LANGUAGE.to_string(),
        }
    }
}

impl From<&str> for LocalizedString {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}
