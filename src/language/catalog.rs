//! Language discovery.
//!
//! A [`Catalog`] maps a language identifier (its directory name) to its
//! header. [`LanguageManager`] owns the current catalog and rescans on demand.

use super::header::LanguageHeader;
use crate::config::{Config, DiscoveryMode};
use crate::error::{LocalizationError, Result};
use crate::location::{ContentFetcher, Location};
use crate::observable::{Change, Observable};
use crate::retry::RetryConfig;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Immutable identifier → header map produced by one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    headers: BTreeMap<String, Arc<LanguageHeader>>,
}

impl Catalog {
    /// Header of `id`, if the scan found it.
    pub fn get(&self, id: &str) -> Option<&Arc<LanguageHeader>> {
        self.headers.get(id)
    }

    /// Whether `id` was found by the scan.
    pub fn contains(&self, id: &str) -> bool {
        self.headers.contains_key(id)
    }

    /// Identifiers in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.headers.keys().map(String::as_str)
    }

    /// `(id, header)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<LanguageHeader>)> {
        self.headers.iter().map(|(id, header)| (id.as_str(), header))
    }

    /// Number of languages found.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl FromIterator<(String, LanguageHeader)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (String, LanguageHeader)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(id, header)| (id, Arc::new(header)))
                .collect(),
        }
    }
}

/// Scan the configured root and build a fresh catalog.
///
/// Only a failure to read the root (or the manifest) is an error. A
/// directory without a header file is skipped silently; a header that
/// cannot be read or parsed is logged and skipped.
pub async fn scan(config: &Config, fetcher: &ContentFetcher) -> Result<Catalog> {
    let candidates = match config.discovery {
        DiscoveryMode::Directory => {
            let root = config.languages_root.as_path().ok_or_else(|| LocalizationError::Scan {
                root: config.languages_root.to_string(),
                message: "directory discovery needs a filesystem root".to_string(),
            })?;
            directory_candidates(root, &config.header_filename).await?
        }
        DiscoveryMode::Manifest => manifest_candidates(config, fetcher).await?,
    };

    debug!("Found {} language candidates", candidates.len());

    // start every header read, then collect in candidate order
    let loads = candidates
        .iter()
        .map(|(_, header_file)| LanguageHeader::load(fetcher, header_file.clone()));
    let results = futures::future::join_all(loads).await;

    let mut headers = Vec::with_capacity(candidates.len());
    for ((id, header_file), result) in candidates.into_iter().zip(results) {
        match result {
            Ok(header) => headers.push((id, header)),
            Err(e) => error!("Failed to read language header \"{}\": {}", header_file, e),
        }
    }

    Ok(headers.into_iter().collect())
}

async fn directory_candidates(root: &Path, header_filename: &str) -> Result<Vec<(String, Location)>> {
    let scan_error = |e: std::io::Error| LocalizationError::Scan {
        root: root.display().to_string(),
        message: e.to_string(),
    };

    if tokio::fs::metadata(root).await.is_err() {
        info!("Language root {} does not exist, creating it", root.display());
        tokio::fs::create_dir_all(root).await.map_err(scan_error)?;
    }

    let mut entries = tokio::fs::read_dir(root).await.map_err(scan_error)?;
    let mut candidates = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
        let is_dir = match entry.file_type().await {
            Ok(file_type) => file_type.is_dir(),
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !is_dir {
            continue;
        }

        let header_path = entry.path().join(header_filename);
        if !tokio::fs::metadata(&header_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            debug!("No {} in {}, skipping", header_filename, entry.path().display());
            continue;
        }

        let id = entry.file_name().to_string_lossy().into_owned();
        candidates.push((id, Location::Path(header_path)));
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(candidates)
}

async fn manifest_candidates(
    config: &Config,
    fetcher: &ContentFetcher,
) -> Result<Vec<(String, Location)>> {
    let root = &config.languages_root;
    let manifest = root.join(&config.manifest_filename);

    let content = fetcher
        .read_text(&manifest)
        .await
        .map_err(|e| LocalizationError::Scan {
            root: root.to_string(),
            message: format!("failed to read manifest {}: {}", manifest, e),
        })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|name| {
            let header = root.join(name).join(&config.header_filename);
            (name.to_string(), header)
        })
        .collect())
}

/// Catalog value as observed by consumers. `None` until the first scan
/// succeeds.
pub type SharedCatalog = Option<Arc<Catalog>>;

/// Owns the current catalog and publishes every replacement.
#[derive(Debug)]
pub struct LanguageManager {
    config: Config,
    fetcher: ContentFetcher,
    headers: Observable<SharedCatalog>,
    generation: AtomicU64,
}

impl LanguageManager {
    /// Manager with an empty catalog; call [`LanguageManager::reload`] to scan.
    pub fn new(config: Config) -> Result<Self> {
        let retry = RetryConfig {
            max_attempts: config.http_attempts.max(1),
            ..RetryConfig::remote_fetch()
        };
        let fetcher = ContentFetcher::new(config.http_timeout)?.with_retry(retry);
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Like [`LanguageManager::new`] with a caller-supplied fetcher.
    pub fn with_fetcher(config: Config, fetcher: ContentFetcher) -> Self {
        Self {
            config,
            fetcher,
            headers: Observable::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetcher(&self) -> &ContentFetcher {
        &self.fetcher
    }

    /// Catalog from the last successful scan, `None` before the first.
    pub fn headers(&self) -> SharedCatalog {
        self.headers.get()
    }

    /// Every catalog replacement as `(new, old)`.
    pub fn subscribe(&self) -> broadcast::Receiver<Change<SharedCatalog>> {
        self.headers.subscribe()
    }

    /// Header of `id` in the current catalog.
    ///
    /// Fails with [`LocalizationError::NotFound`] when no scan has finished
    /// yet or the catalog has no such language.
    pub fn header(&self, id: &str) -> Result<Arc<LanguageHeader>> {
        self.headers()
            .and_then(|catalog| catalog.get(id).cloned())
            .ok_or_else(|| LocalizationError::NotFound(id.to_string()))
    }

    pub(crate) fn subscribe_with_current(
        &self,
    ) -> (SharedCatalog, broadcast::Receiver<Change<SharedCatalog>>) {
        self.headers.subscribe_with_current()
    }

    /// Rescan and replace the catalog.
    ///
    /// On failure the previous catalog stays in place. A scan that finishes
    /// after a newer `reload` started is discarded.
    pub async fn reload(&self) -> Result<Arc<Catalog>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Scanning languages at {}", self.config.languages_root);

        let catalog = match scan(&self.config, &self.fetcher).await {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                error!("Language scan failed, keeping previous catalog: {}", e);
                return Err(e);
            }
        };

        // compare and publish under the catalog lock so an older scan cannot
        // land after a newer one
        let published = self.headers.update(|_| {
            (self.generation.load(Ordering::SeqCst) == generation).then(|| Some(catalog.clone()))
        });
        if published.is_none() {
            debug!("Discarding superseded language scan");
            return Ok(catalog);
        }

        info!("Found {} languages", catalog.len());
        Ok(catalog)
    }
}
