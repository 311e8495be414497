//! Where language content lives: a filesystem path or an HTTP URL.
//!
//! Discovery, header loading and data loading all go through
//! [`ContentFetcher::read_text`], so a language root can be served from disk
//! or from a static web host without the rest of the crate caring which.

use crate::error::{LocalizationError, Result};
use crate::retry::{with_retry_if, RetryConfig};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Path(PathBuf),
    Url(String),
}

impl Location {
    /// `http://` and `https://` strings become URLs, anything else a path.
    pub fn parse(value: &str) -> Self {
        let lower = value.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(value.to_string())
        } else {
            Self::Path(PathBuf::from(value))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Url(_))
    }

    /// Filesystem path, `None` for URLs.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Url(_) => None,
        }
    }

    /// Append a relative path, keeping the location kind.
    pub fn join(&self, relative: &str) -> Self {
        match self {
            Self::Path(path) => Self::Path(path.join(relative)),
            Self::Url(url) => {
                let relative = relative.replace('\\', "/");
                Self::Url(format!(
                    "{}/{}",
                    url.trim_end_matches('/'),
                    relative.trim_start_matches('/')
                ))
            }
        }
    }

    /// The containing directory (or URL prefix).
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Path(path) => path.parent().map(|p| Self::Path(p.to_path_buf())),
            Self::Url(url) => {
                let trimmed = url.trim_end_matches('/');
                let (prefix, _) = trimmed.rsplit_once('/')?;
                if prefix.ends_with('/') || prefix.ends_with(':') {
                    None
                } else {
                    Some(Self::Url(prefix.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for Location {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

/// Outcome classification used to decide whether an HTTP fetch is retried.
#[derive(Debug)]
enum FetchFailure {
    Transient(String),
    Permanent(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(m) | Self::Permanent(m) => f.write_str(m),
        }
    }
}

/// Reads text content from any [`Location`].
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl ContentFetcher {
    /// Fetcher with an HTTP client using `timeout` and the default retry policy.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LocalizationError::Http {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            retry: RetryConfig::remote_fetch(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Read a whole file or HTTP body as text.
    ///
    /// URL fetches retry network errors and 5xx responses; 4xx fail at once.
    pub async fn read_text(&self, location: &Location) -> Result<String> {
        match location {
            Location::Path(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| LocalizationError::io(path.display(), e)),
            Location::Url(url) => self.fetch_url(url).await,
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<String> {
        let operation_name = format!("GET {}", url);

        with_retry_if(
            &self.retry,
            &operation_name,
            || async move {
                debug!("Fetching {}", url);
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| FetchFailure::Transient(e.to_string()))?;

                let status = response.status();
                if status.is_server_error() {
                    return Err(FetchFailure::Transient(format!("HTTP {}", status)));
                }
                if !status.is_success() {
                    return Err(FetchFailure::Permanent(format!("HTTP {}", status)));
                }

                response
                    .text()
                    .await
                    .map_err(|e| FetchFailure::Transient(e.to_string()))
            },
            |failure| matches!(failure, FetchFailure::Transient(_)),
        )
        .await
        .map_err(|failure| LocalizationError::Http {
            url: url.to_string(),
            message: failure.to_string(),
        })
    }
}
