//! Remote origin client.
//!
//! Every archive lives at `<origin_prefix><percent-encoded identifier>.<ext>`
//! on one static HTTP(S) server. [`Origin`] is the seam the pipeline and the
//! scanner talk to; [`HttpOrigin`] is the real implementation.

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;

use crate::cache::ArtifactId;

/// Errors raised while talking to the origin.
#[derive(thiserror::Error, Debug)]
pub enum OriginError {
    /// The configured prefix is not a usable base URL.
    #[error("invalid origin prefix {prefix:?}: {reason}")]
    InvalidPrefix {
        /// Configured prefix
        prefix: String,
        /// Why it was rejected
        reason: String,
    },

    /// The origin answered with a non-success status.
    #[error("origin returned HTTP {status} for {url}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Transport-level failure (DNS, TLS, connection, timeout).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// An open response body.
pub struct OriginBody {
    /// Body reader
    pub reader: Box<dyn Read + Send>,
    /// Declared length, when the origin sent one
    pub content_length: Option<u64>,
}

impl std::fmt::Debug for OriginBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Source of artifact archives.
pub trait Origin: Send + Sync {
    /// The URL an artifact is fetched from.
    ///
    /// # Errors
    ///
    /// Returns [`OriginError::InvalidPrefix`] if no URL can be built.
    fn url_for(&self, id: &ArtifactId, extension: &str) -> Result<String, OriginError>;

    /// Start downloading an artifact.
    ///
    /// # Errors
    ///
    /// Any transport failure or non-success status.
    fn open(&self, id: &ArtifactId, extension: &str) -> Result<OriginBody, OriginError>;

    /// Whether the origin has the artifact, without downloading it.
    ///
    /// # Errors
    ///
    /// Transport failures only; a non-success status is `Ok(false)`.
    fn exists(&self, id: &ArtifactId, extension: &str) -> Result<bool, OriginError>;

    /// The configured prefix, recorded in scan reports.
    fn prefix(&self) -> &str;
}

/// Build `<prefix><id>.<ext>` with the filename percent-encoded as one path segment.
///
/// A trailing slash on the prefix is optional: `https://host/games` and
/// `https://host/games/` both yield `https://host/games/<file>`.
///
/// # Errors
///
/// Returns [`OriginError::InvalidPrefix`] if `prefix` is not an absolute
/// hierarchical URL.
pub fn artifact_url(prefix: &str, id: &ArtifactId, extension: &str) -> Result<Url, OriginError> {
    let invalid = |reason: String| OriginError::InvalidPrefix {
        prefix: prefix.to_string(),
        reason,
    };
    let mut url = Url::parse(prefix).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("URL cannot be a base".to_string()))?
        .pop_if_empty()
        .push(&id.file_name(extension));
    Ok(url)
}

/// HTTP(S) origin backed by a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    prefix: String,
    client: Client,
}

impl HttpOrigin {
    /// Create a client for `prefix`.
    ///
    /// `timeout` bounds a whole request including the body; `None` disables it.
    ///
    /// # Errors
    ///
    /// Fails if the prefix is not a valid base URL or the TLS backend cannot
    /// be initialized.
    pub fn new(prefix: impl Into<String>, timeout: Option<Duration>) -> Result<Self, OriginError> {
        let prefix = prefix.into();
        // Validate eagerly so a bad config fails at startup, not on first request.
        let probe = ArtifactId::parse("probe").map_err(|e| OriginError::InvalidPrefix {
            prefix: prefix.clone(),
            reason: e.to_string(),
        })?;
        artifact_url(&prefix, &probe, "zip")?;

        let client = Client::builder()
            .user_agent(concat!("gamebin/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()?;
        Ok(Self { prefix, client })
    }
}

impl Origin for HttpOrigin {
    fn url_for(&self, id: &ArtifactId, extension: &str) -> Result<String, OriginError> {
        artifact_url(&self.prefix, id, extension).map(String::from)
    }

    fn open(&self, id: &ArtifactId, extension: &str) -> Result<OriginBody, OriginError> {
        let url = artifact_url(&self.prefix, id, extension)?;
        log::debug!("GET {}", url);
        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(OriginError::Status {
                url: url.into(),
                status: status.as_u16(),
            });
        }
        let content_length = response.content_length();
        Ok(OriginBody {
            reader: Box::new(response),
            content_length,
        })
    }

    fn exists(&self, id: &ArtifactId, extension: &str) -> Result<bool, OriginError> {
        let url = artifact_url(&self.prefix, id, extension)?;
        let response = self.client.head(url.clone()).send()?;
        log::trace!("HEAD {} -> {}", url, response.status());
        Ok(response.status().is_success())
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}
