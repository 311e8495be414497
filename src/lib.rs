//! Runtime text and audio localization data.
//!
//! Discovers languages on disk or over HTTP, loads a language's key→text and
//! key→audio tables, lets callers edit entries, and writes edits back to the
//! file each key came from without ever leaving a file half-written.

pub mod config;
pub mod error;
pub mod language;
pub mod location;
pub mod observable;
pub mod retry;

pub use config::{Config, DiscoveryMode};
pub use error::{LocalizationError, SaveError};
pub use language::{
    Catalog, LanguageHeader, LanguageLoader, LanguageManager, LanguageRequest, LanguageStore,
    LoadParams, LoadState, LocalizedString, RequestRegistry, Section, StoreEvent, StoreOptions,
};
pub use location::{ContentFetcher, Location};
pub use observable::{Change, Observable};
