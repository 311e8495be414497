//! Language data: discovery, loading, editing and saving.
//!
//! # Architecture
//!
//! - `header`: one language's descriptor (name, author, icon, data files)
//! - `catalog`: directory/manifest scan and the `LanguageManager` that owns the catalog
//! - `codec`: streaming reader and ordered writer for data files
//! - `store`: merged text/audio tables, edits, and the two-phase save
//! - `loader`: keeps a language loaded for a `(manager, id)` binding, dropping stale loads
//! - `registry`: reference-counted sharing of bindings between consumers
//! - `localized`: key lookups against the loaded store
//!
//! # Example
//!
//! ```rust,ignore
//! use language_store::{Config, LanguageManager, RequestRegistry};
//!
//! let manager = Arc::new(LanguageManager::new(Config::from_env()?)?);
//! manager.reload().await?;
//!
//! let registry = RequestRegistry::new();
//! registry.set_active_manager(Some(manager));
//!
//! let mut request = registry.create_request("en");
//! if let Some(store) = request.settled().await.store() {
//!     store.set_text("menu.play", "Play");
//!     store.save().await?;
//! }
//! request.dispose();
//! ```

mod catalog;
pub mod codec;
mod header;
mod loader;
mod localized;
mod registry;
mod store;

pub use catalog::{scan, Catalog, LanguageManager, SharedCatalog};
pub use codec::{DataFileContents, Entry, Section};
pub use header::LanguageHeader;
pub use loader::{LanguageLoader, LoadParams, LoadState};
pub use localized::{LocalizedString, NO_LANGUAGE};
pub use registry::{LanguageRequest, RequestRegistry};
pub use store::{LanguageStore, StoreEvent, StoreOptions};
