//! Language header: the descriptor that names a language and lists its data files.

use crate::error::{LocalizationError, Result};
use crate::location::{ContentFetcher, Location};
use serde::Deserialize;

/// On-disk shape of a header file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeaderFile {
    name: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    data_files: Vec<String>,
}

/// Display metadata and data-file list of one language.
///
/// Immutable once loaded; a rescan produces fresh instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageHeader {
    display_name: String,
    author: String,
    icon: Option<String>,
    data_files: Vec<String>,
    directory: Location,
    header_file: Location,
}

impl LanguageHeader {
    /// Parse header JSON located at `header_file`.
    pub fn parse(json: &str, header_file: Location) -> Result<Self> {
        let raw: HeaderFile =
            serde_json::from_str(json).map_err(|source| LocalizationError::HeaderParse {
                path: header_file.to_string(),
                source,
            })?;

        let directory = header_file
            .parent()
            .unwrap_or_else(|| header_file.clone());

        Ok(Self {
            display_name: raw.name,
            author: raw.author,
            icon: raw.icon.filter(|icon| !icon.trim().is_empty()),
            data_files: raw.data_files,
            directory,
            header_file,
        })
    }

    /// Fetch and parse the header at `header_file`.
    pub async fn load(fetcher: &ContentFetcher, header_file: Location) -> Result<Self> {
        let json = fetcher.read_text(&header_file).await?;
        Self::parse(&json, header_file)
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Data files relative to [`Self::directory`], in header order.
    pub fn data_files(&self) -> &[String] {
        &self.data_files
    }

    /// Directory containing the header; data files resolve against it.
    pub fn directory(&self) -> &Location {
        &self.directory
    }

    pub fn header_file(&self) -> &Location {
        &self.header_file
    }

    /// Icon location, or `None` when the header has no icon.
    pub fn icon_location(&self) -> Option<Location> {
        self.icon.as_deref().map(|icon| self.directory.join(icon))
    }

    /// [`Self::data_files`] resolved against [`Self::directory`].
    pub fn data_file_locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.data_files.iter().map(|file| self.directory.join(file))
    }
}
