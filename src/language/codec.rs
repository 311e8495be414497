//! Data file codec.
//!
//! A data file is a JSON object with up to two sections, `text` and `audio`,
//! each a flat string-to-string object:
//!
//! ```json
//! {
//!   "text": { "greeting": "hello" },
//!   "audio": { "greeting": "voice/greeting.ogg" }
//! }
//! ```
//!
//! Reading streams `(section, key, value)` triples to a callback in file
//! order without building an intermediate map. Unknown root members are
//! skipped. Writing emits exactly the given entries, in the given order,
//! and omits empty sections.

use crate::error::{LocalizationError, Result};
use crate::location::{ContentFetcher, Location};
use serde::de::{DeserializeSeed, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    Text,
    Audio,
}

impl Section {
    pub const ALL: [Section; 2] = [Section::Text, Section::Audio];

    /// Member name inside the root object.
    pub fn key(self) -> &'static str {
        match self {
            Section::Text => "text",
            Section::Audio => "audio",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "text" => Some(Section::Text),
            "audio" => Some(Section::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub section: Section,
    pub key: String,
    pub value: String,
}

/// Stream every entry of `json` to `visit`, in file order.
///
/// `source` names the file in error messages.
pub fn parse_entries<F>(json: &str, source: &str, mut visit: F) -> Result<()>
where
    F: FnMut(Section, String, String),
{
    let mut deserializer = serde_json::Deserializer::from_str(json);
    RootSeed { visit: &mut visit }
        .deserialize(&mut deserializer)
        .and_then(|()| deserializer.end())
        .map_err(|e| LocalizationError::DataFormat {
            path: source.to_string(),
            message: e.to_string(),
        })
}

/// Read a whole data file into an ordered entry list.
pub async fn read_file(fetcher: &ContentFetcher, location: &Location) -> Result<Vec<Entry>> {
    let json = fetcher.read_text(location).await?;
    let mut entries = Vec::new();
    parse_entries(&json, &location.to_string(), |section, key, value| {
        entries.push(Entry {
            section,
            key,
            value,
        })
    })?;
    Ok(entries)
}

struct RootSeed<'a, F> {
    visit: &'a mut F,
}

impl<'de, F> DeserializeSeed<'de> for RootSeed<'_, F>
where
    F: FnMut(Section, String, String),
{
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F> Visitor<'de> for RootSeed<'_, F>
where
    F: FnMut(Section, String, String),
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a data file object with optional \"text\" and \"audio\" objects")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(name) = map.next_key::<String>()? {
            match Section::from_key(&name) {
                Some(section) => map.next_value_seed(SectionSeed {
                    section,
                    visit: &mut *self.visit,
                })?,
                None => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

struct SectionSeed<'a, F> {
    section: Section,
    visit: &'a mut F,
}

impl<'de, F> DeserializeSeed<'de> for SectionSeed<'_, F>
where
    F: FnMut(Section, String, String),
{
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F> Visitor<'de> for SectionSeed<'_, F>
where
    F: FnMut(Section, String, String),
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a flat string object for section \"{}\"", self.section)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some((key, value)) = map.next_entry::<String, String>()? {
            (*self.visit)(self.section, key, value);
        }
        Ok(())
    }
}

/// Ordered entries destined for one physical file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataFileContents {
    pub text: Vec<(String, String)>,
    pub audio: Vec<(String, String)>,
}

impl DataFileContents {
    pub fn push(&mut self, section: Section, key: String, value: String) {
        self.section_mut(section).push((key, value));
    }

    pub fn section(&self, section: Section) -> &[(String, String)] {
        match section {
            Section::Text => &self.text,
            Section::Audio => &self.audio,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut Vec<(String, String)> {
        match section {
            Section::Text => &mut self.text,
            Section::Audio => &mut self.audio,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.audio.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len() + self.audio.len()
    }

    /// Pretty JSON with a trailing newline.
    pub fn render(&self) -> String {
        // serializing string pairs into a String cannot fail
        let mut json = serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string());
        json.push('\n');
        json
    }
}

impl Serialize for DataFileContents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let sections: Vec<Section> = Section::ALL
            .into_iter()
            .filter(|s| !self.section(*s).is_empty())
            .collect();

        let mut map = serializer.serialize_map(Some(sections.len()))?;
        for section in sections {
            map.serialize_entry(section.key(), &OrderedEntries(self.section(section)))?;
        }
        map.end()
    }
}

struct OrderedEntries<'a>(&'a [(String, String)]);

impl Serialize for OrderedEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Write `contents` to `path` and flush it to stable storage.
pub async fn write_file(path: &Path, contents: &DataFileContents) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents.render().as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}
