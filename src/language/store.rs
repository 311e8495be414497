//! Merged, editable view of one language and its crash-safe save.
//!
//! A store is built by reading every data file of a header in order; a key
//! that appears in several files takes the value from the last one. Edits
//! only touch memory until [`LanguageStore::save`] writes them back.
//!
//! Save never remembers where a key came from. It re-reads the physical
//! files, assigns each key to the last non-fallback file that contains it,
//! and sends everything else to the fallback file. New contents are staged
//! in temp files first; originals are only opened once every temp file is
//! complete, and only written once every original is open.

use super::codec::{self, DataFileContents, Section};
use super::header::LanguageHeader;
use crate::config::Config;
use crate::error::{LocalizationError, Result, SaveError};
use crate::location::{ContentFetcher, Location};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

/// Save-related settings taken from [`Config`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub fallback_filename: String,
    pub temp_dir: Option<PathBuf>,
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fallback_filename: config.fallback_filename.clone(),
            temp_dir: config.temp_dir.clone(),
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            fallback_filename: "default.json".to_string(),
            temp_dir: None,
        }
    }
}

/// Published after every successful mutation or save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    TextSet { key: String },
    TextRemoved { key: String },
    AudioSet { key: String },
    AudioRemoved { key: String },
    Saved,
}

#[derive(Debug, Default)]
struct Entries {
    texts: IndexMap<String, String>,
    audio: IndexMap<String, String>,
    revision: u64,
    saved_revision: u64,
}

impl Entries {
    fn map(&self, section: Section) -> &IndexMap<String, String> {
        match section {
            Section::Text => &self.texts,
            Section::Audio => &self.audio,
        }
    }

    fn map_mut(&mut self, section: Section) -> &mut IndexMap<String, String> {
        match section {
            Section::Text => &mut self.texts,
            Section::Audio => &mut self.audio,
        }
    }
}

/// In-memory language: merged text and audio tables plus dirty tracking.
#[derive(Debug)]
pub struct LanguageStore {
    header: Arc<LanguageHeader>,
    options: StoreOptions,
    entries: RwLock<Entries>,
    events: broadcast::Sender<StoreEvent>,
    save_lock: Mutex<()>,
}

impl LanguageStore {
    /// Read every data file of `header` and merge them in header order.
    ///
    /// All files are fetched concurrently; any unreadable or malformed file
    /// fails the whole load. When the fallback file exists on disk but the
    /// header does not list it, it is merged last.
    pub async fn load(
        header: Arc<LanguageHeader>,
        fetcher: &ContentFetcher,
        options: StoreOptions,
    ) -> Result<Self> {
        let mut locations: Vec<Location> = header.data_file_locations().collect();

        let fallback = header.directory().join(&options.fallback_filename);
        if !locations.contains(&fallback) {
            let on_disk = match fallback.as_path() {
                Some(path) => is_file(path).await,
                None => false,
            };
            if on_disk {
                debug!("Merging unlisted fallback file {}", fallback);
                locations.push(fallback);
            }
        }

        debug!(
            "Loading language '{}' from {} data files",
            header.display_name(),
            locations.len()
        );

        let files =
            futures::future::try_join_all(locations.iter().map(|loc| codec::read_file(fetcher, loc)))
                .await?;

        let mut entries = Entries::default();
        for entry in files.into_iter().flatten() {
            entries.map_mut(entry.section).insert(entry.key, entry.value);
        }

        info!(
            "Loaded language '{}': {} texts, {} audio entries",
            header.display_name(),
            entries.texts.len(),
            entries.audio.len()
        );

        Ok(Self::from_parts(header, options, entries))
    }

    /// An empty store for `header`, as if every data file were empty.
    pub fn empty(header: Arc<LanguageHeader>, options: StoreOptions) -> Self {
        Self::from_parts(header, options, Entries::default())
    }

    fn from_parts(header: Arc<LanguageHeader>, options: StoreOptions, entries: Entries) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            header,
            options,
            entries: RwLock::new(entries),
            events,
            save_lock: Mutex::new(()),
        }
    }

    /// Header this store was loaded from.
    pub fn header(&self) -> &Arc<LanguageHeader> {
        &self.header
    }

    /// Mutation and save notifications.
    ///
    /// Receivers that fall behind get `Lagged` and should re-read the store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Text for `key`, if any file defines it.
    pub fn text(&self, key: &str) -> Option<String> {
        self.read().texts.get(key).cloned()
    }

    /// The text for `key`, or the key itself when it has no text.
    pub fn localize(&self, key: &str) -> String {
        self.text(key).unwrap_or_else(|| key.to_string())
    }

    /// Audio path for `key` as written in the data file, relative to the language directory.
    pub fn audio(&self, key: &str) -> Option<String> {
        self.read().audio.get(key).cloned()
    }

    /// Audio path for `key` resolved against the language directory.
    pub fn audio_location(&self, key: &str) -> Option<Location> {
        self.audio(key)
            .map(|relative| self.header.directory().join(&relative))
    }

    /// Snapshot of all texts in merge order.
    pub fn texts(&self) -> IndexMap<String, String> {
        self.read().texts.clone()
    }

    /// Snapshot of all audio entries in merge order.
    pub fn audio_entries(&self) -> IndexMap<String, String> {
        self.read().audio.clone()
    }

    /// Number of entries in `section`.
    pub fn len(&self, section: Section) -> usize {
        self.read().map(section).len()
    }

    /// Whether edits were made since the last successful save (or the load).
    pub fn is_dirty(&self) -> bool {
        let entries = self.read();
        entries.revision != entries.saved_revision
    }

    /// Insert or replace a text. A new key is appended after existing ones.
    pub fn set_text(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.write_entry(Section::Text, key.clone(), value.into());
        self.publish(StoreEvent::TextSet { key });
    }

    /// Returns whether the key existed.
    pub fn remove_text(&self, key: &str) -> bool {
        let removed = self.remove_entry(Section::Text, key);
        if removed {
            self.publish(StoreEvent::TextRemoved {
                key: key.to_string(),
            });
        }
        removed
    }

    /// Insert or replace an audio path.
    pub fn set_audio(&self, key: impl Into<String>, path: impl Into<String>) {
        let key = key.into();
        self.write_entry(Section::Audio, key.clone(), path.into());
        self.publish(StoreEvent::AudioSet { key });
    }

    /// Returns whether the key existed.
    pub fn remove_audio(&self, key: &str) -> bool {
        let removed = self.remove_entry(Section::Audio, key);
        if removed {
            self.publish(StoreEvent::AudioRemoved {
                key: key.to_string(),
            });
        }
        removed
    }

    fn write_entry(&self, section: Section, key: String, value: String) {
        let mut entries = self.write();
        entries.map_mut(section).insert(key, value);
        entries.revision += 1;
    }

    fn remove_entry(&self, section: Section, key: &str) -> bool {
        let mut entries = self.write();
        // shift_remove keeps the relative order of the remaining keys
        let removed = entries.map_mut(section).shift_remove(key).is_some();
        if removed {
            entries.revision += 1;
        }
        removed
    }

    fn publish(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write every entry back to the file it belongs to.
    ///
    /// Concurrent calls on the same store are queued. Edits made while a
    /// save is running are not lost; they keep the store dirty.
    pub async fn save(&self) -> Result<()> {
        let directory = self
            .header
            .directory()
            .as_path()
            .ok_or_else(|| LocalizationError::ReadOnlySource(self.header.directory().to_string()))?
            .to_path_buf();

        let _guard = self.save_lock.lock().await;

        let (snapshot, revision) = {
            let entries = self.read();
            let snapshot = Snapshot {
                texts: entries.texts.clone(),
                audio: entries.audio.clone(),
            };
            (snapshot, entries.revision)
        };

        let plan = plan_save(&self.header, &self.options, &directory, &snapshot).await?;

        info!(
            "Saving language '{}': {} files",
            self.header.display_name(),
            plan.len()
        );

        let temp_dir = self
            .options
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        let staged = stage(&plan, &temp_dir).await.map_err(|source| SaveError {
            directory: directory.clone(),
            staged: Vec::new(),
            copy_started: false,
            source,
        })?;

        if let Err((source, copy_started)) = copy_back(&staged).await {
            let error = SaveError {
                directory,
                staged,
                copy_started,
                source,
            };
            error!(
                "Error while saving language data at {}. Data saved to temp files. Temp file map:\n{}",
                error.directory.display(),
                error.recovery_map()
            );
            return Err(error.into());
        }

        for (_, temp) in &staged {
            if let Err(e) = tokio::fs::remove_file(temp).await {
                warn!("Failed to remove temp file {}: {}", temp.display(), e);
            }
        }

        self.write().saved_revision = revision;
        self.publish(StoreEvent::Saved);
        info!("Saved language '{}'", self.header.display_name());
        Ok(())
    }
}

/// One physical file and the entries it will contain after the save.
#[derive(Debug)]
struct PlannedFile {
    target: PathBuf,
    contents: DataFileContents,
}

type EntryKey = (Section, String);

/// Entries as they were when the save started.
#[derive(Debug)]
struct Snapshot {
    texts: IndexMap<String, String>,
    audio: IndexMap<String, String>,
}

impl Snapshot {
    fn value(&self, section: Section, key: &str) -> Option<&String> {
        match section {
            Section::Text => self.texts.get(key),
            Section::Audio => self.audio.get(key),
        }
    }

    /// Every key, texts first, in memory order.
    fn keys(&self) -> impl Iterator<Item = EntryKey> + '_ {
        self.texts
            .keys()
            .map(|k| (Section::Text, k.clone()))
            .chain(self.audio.keys().map(|k| (Section::Audio, k.clone())))
    }
}

/// Partition the in-memory entries across the physical files.
async fn plan_save(
    header: &LanguageHeader,
    options: &StoreOptions,
    directory: &Path,
    snapshot: &Snapshot,
) -> Result<Vec<PlannedFile>> {
    let fallback_path = directory.join(&options.fallback_filename);

    let mut named: Vec<PathBuf> = Vec::new();
    for file in header.data_files() {
        let path = directory.join(file);
        if path != fallback_path && !named.contains(&path) {
            named.push(path);
        }
    }

    // Which keys each named file physically holds, and which file owns each key.
    let mut file_keys: Vec<Vec<EntryKey>> = Vec::with_capacity(named.len());
    let mut owner: HashMap<EntryKey, usize> = HashMap::new();
    for (index, path) in named.iter().enumerate() {
        let keys = match read_keys(path).await? {
            Some(keys) => keys,
            None => {
                warn!(
                    "Data file {} no longer exists, its keys go to the fallback file",
                    path.display()
                );
                Vec::new()
            }
        };
        for key in &keys {
            owner.insert(key.clone(), index);
        }
        file_keys.push(keys);
    }

    let mut plan = Vec::new();
    let mut claimed: HashSet<EntryKey> = HashSet::new();

    for (index, (path, keys)) in named.iter().zip(file_keys).enumerate() {
        // a missing file only gets recreated if it is the fallback
        if keys.is_empty() && !is_file(path).await {
            continue;
        }

        let mut contents = DataFileContents::default();
        for key in keys {
            if owner.get(&key) != Some(&index) || claimed.contains(&key) {
                continue;
            }
            if let Some(value) = snapshot.value(key.0, &key.1) {
                contents.push(key.0, key.1.clone(), value.clone());
                claimed.insert(key);
            }
        }

        debug!("{}: {} entries", path.display(), contents.len());
        plan.push(PlannedFile {
            target: path.clone(),
            contents,
        });
    }

    // Whatever no named file claimed belongs to the fallback file. Keep the
    // fallback's existing order, then append new keys in memory order.
    let fallback_exists = tokio::fs::metadata(&fallback_path).await.is_ok();
    let existing_order = if is_file(&fallback_path).await {
        read_keys(&fallback_path).await?.unwrap_or_default()
    } else {
        Vec::new()
    };

    let mut fallback = DataFileContents::default();
    for key in existing_order.into_iter().chain(snapshot.keys()) {
        if claimed.contains(&key) {
            continue;
        }
        if let Some(value) = snapshot.value(key.0, &key.1) {
            fallback.push(key.0, key.1.clone(), value.clone());
            claimed.insert(key);
        }
    }

    if !fallback.is_empty() || fallback_exists {
        debug!("{}: {} entries", fallback_path.display(), fallback.len());
        plan.push(PlannedFile {
            target: fallback_path,
            contents: fallback,
        });
    }

    Ok(plan)
}

/// Keys of a physical file in file order, `None` if the file is gone.
async fn read_keys(path: &Path) -> Result<Option<Vec<EntryKey>>> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LocalizationError::io(path.display(), e)),
    };

    let mut keys = Vec::new();
    codec::parse_entries(&json, &path.display().to_string(), |section, key, _| {
        keys.push((section, key))
    })?;
    Ok(Some(keys))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Write every planned file to its own fresh temp file.
///
/// Returns `(original, temp)` pairs. On failure the temp files created so
/// far are removed; no original has been touched.
async fn stage(plan: &[PlannedFile], temp_dir: &Path) -> std::io::Result<Vec<(PathBuf, PathBuf)>> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(plan.len());

    for planned in plan {
        let result = async {
            let temp = tempfile::Builder::new()
                .prefix("language-save-")
                .suffix(".json")
                .tempfile_in(temp_dir)?;
            let (_, temp_path) = temp.keep().map_err(|e| e.error)?;
            staged.push((planned.target.clone(), temp_path.clone()));
            codec::write_file(&temp_path, &planned.contents).await
        }
        .await;

        if let Err(e) = result {
            for (_, temp) in &staged {
                let _ = tokio::fs::remove_file(temp).await;
            }
            return Err(e);
        }
    }

    Ok(staged)
}

/// Copy staged temp files over their originals.
///
/// Every original and every temp file is opened before any byte is written.
/// Each temp file is opened before its original, and originals are opened
/// without truncation, so an open failure leaves all originals intact. The flag in the error reports whether copying had
/// begun.
async fn copy_back(staged: &[(PathBuf, PathBuf)]) -> Result<(), (std::io::Error, bool)> {
    let mut handles = Vec::with_capacity(staged.len());
    for (original, temp) in staged {
        // temp first, so a failure here never leaves a new empty original behind
        let source = tokio::fs::File::open(temp).await.map_err(|e| (e, false))?;
        let destination = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(original)
            .await
            .map_err(|e| (e, false))?;
        handles.push((source, destination));
    }

    for (mut source, mut destination) in handles {
        destination.set_len(0).await.map_err(|e| (e, true))?;
        tokio::io::copy(&mut source, &mut destination)
            .await
            .map_err(|e| (e, true))?;
        destination.sync_all().await.map_err(|e| (e, true))?;
    }

    Ok(())
}
