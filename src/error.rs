//! Error taxonomy for catalog scans, store loads and saves.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = LocalizationError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LocalizationError {
    /// The language root (directory or manifest) could not be read.
    #[error("failed to scan language root {root}: {message}")]
    Scan { root: String, message: String },

    /// One language's header is malformed.
    #[error("failed to parse language header {path}: {source}")]
    HeaderParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// A data file does not follow the text/audio object grammar.
    #[error("malformed data file {path}: {message}")]
    DataFormat { path: String, message: String },

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("no language named '{0}' in the catalog")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error fetching {url}: {message}")]
    Http { url: String, message: String },

    #[error("{0} is not a filesystem location and cannot be written")]
    ReadOnlySource(String),
}

impl LocalizationError {
    pub(crate) fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// A save that failed while staging or copying back.
///
/// `staged` maps every original file to the temp file holding its new
/// contents. When `copy_started` is true some originals may already contain
/// the new data; the temp files are the authoritative copy either way.
#[derive(Debug, Error)]
pub struct SaveError {
    pub directory: PathBuf,
    pub staged: Vec<(PathBuf, PathBuf)>,
    pub copy_started: bool,
    #[source]
    pub source: std::io::Error,
}

impl SaveError {
    /// Human-readable original => temp listing for manual recovery.
    pub fn recovery_map(&self) -> String {
        self.staged
            .iter()
            .map(|(original, temp)| format!("{} => {}", original.display(), temp.display()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to save language data at {}: {}",
            self.directory.display(),
            self.source
        )?;
        if !self.staged.is_empty() {
            write!(f, ". Data saved to temp files:\n{}", self.recovery_map())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_error_lists_every_temp_file() {
        let error = SaveError {
            directory: PathBuf::from("/lang/en"),
            staged: vec![
                (PathBuf::from("/lang/en/a.json"), PathBuf::from("/tmp/x1")),
                (PathBuf::from("/lang/en/default.json"), PathBuf::from("/tmp/x2")),
            ],
            copy_started: false,
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };

        let message = error.to_string();
        assert!(message.contains("disk full"));
        assert!(message.contains("/lang/en/a.json => /tmp/x1"));
        assert!(message.contains("/lang/en/default.json => /tmp/x2"));
    }

    #[test]
    fn test_not_found_message() {
        let error = LocalizationError::NotFound("fr".to_string());
        assert_eq!(error.to_string(), "no language named 'fr' in the catalog");
    }
}
