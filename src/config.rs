use crate::location::Location;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// How the catalog discovers language directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Enumerate the immediate subdirectories of the root.
    Directory,
    /// Read a manifest file at the root listing one directory name per line.
    Manifest,
}

impl DiscoveryMode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "directory" | "dir" => Ok(Self::Directory),
            "manifest" => Ok(Self::Manifest),
            other => bail!(
                "Invalid LANGUAGES_DISCOVERY '{}'. Expected 'directory' or 'manifest'",
                other
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Discovery
    pub languages_root: Location,
    pub discovery: DiscoveryMode,
    pub header_filename: String,
    pub manifest_filename: String,

    // Storage
    pub fallback_filename: String,
    pub temp_dir: Option<PathBuf>,

    // HTTP
    pub http_timeout: Duration,
    /// Attempts per remote fetch, including the first.
    pub http_attempts: u32,
}

impl Config {
    /// Defaults for a given root. URL roots always use manifest discovery.
    pub fn new(languages_root: impl Into<Location>) -> Self {
        let languages_root = languages_root.into();
        let discovery = if languages_root.is_remote() {
            DiscoveryMode::Manifest
        } else {
            DiscoveryMode::Directory
        };

        Self {
            languages_root,
            discovery,
            header_filename: "header.json".to_string(),
            manifest_filename: "languages.txt".to_string(),
            fallback_filename: "default.json".to_string(),
            temp_dir: None,
            http_timeout: Duration::from_secs(10),
            http_attempts: 3,
        }
    }

    pub fn with_discovery(mut self, discovery: DiscoveryMode) -> Self {
        // a remote root cannot be enumerated
        if !self.languages_root.is_remote() {
            self.discovery = discovery;
        }
        self
    }

    /// Build from `LANGUAGES_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let root = std::env::var("LANGUAGES_ROOT").unwrap_or_else(|_| "Languages/".to_string());
        let mut config = Self::new(Location::parse(&root));

        if let Ok(mode) = std::env::var("LANGUAGES_DISCOVERY") {
            let mode = DiscoveryMode::parse(&mode).context("LANGUAGES_DISCOVERY is invalid")?;
            config = config.with_discovery(mode);
        }

        if let Ok(name) = std::env::var("LANGUAGES_HEADER_FILE") {
            config.header_filename = name;
        }
        if let Ok(name) = std::env::var("LANGUAGES_MANIFEST_FILE") {
            config.manifest_filename = name;
        }
        if let Ok(name) = std::env::var("LANGUAGES_FALLBACK_FILE") {
            config.fallback_filename = name;
        }

        config.temp_dir = std::env::var("LANGUAGES_TEMP_DIR").ok().map(PathBuf::from);

        config.http_timeout = Duration::from_secs(
            std::env::var("LANGUAGES_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        );
        config.http_attempts = std::env::var("LANGUAGES_HTTP_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        Ok(config)
    }
}
